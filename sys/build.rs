use std::{env, path::PathBuf};

fn probe(name: &str) -> pkg_config::Library {
    pkg_config::Config::new().probe(name).unwrap_or_else(|err| panic!("unable to find lib{}: {}", name, err))
}

fn main() {
    let opusfile = env::var_os("CARGO_FEATURE_OPUSFILE").is_some();

    let mut include_paths = probe("opus").include_paths;
    let mut header = String::from("#include <opus.h>\n");

    if opusfile {
        include_paths.extend(probe("opusfile").include_paths);
        header.push_str("#include <opusfile.h>\n");
    }

    let mut builder = bindgen::Builder::default()
        .header_contents("wrapper.h", &header)
        .clang_args(include_paths.iter().map(|path| format!("-I{}", path.display())))
        .allowlist_function("opus_.*")
        .allowlist_type("Opus.*")
        .allowlist_var("OPUS_.*")
        .default_macro_constant_type(bindgen::MacroTypeVariation::Signed)
        .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()));

    if opusfile {
        builder = builder.allowlist_function("op_.*").allowlist_type("OggOpus.*").allowlist_type("op_.*").allowlist_var("OP_.*");
    }

    let bindings = builder.generate().expect("unable to generate opus bindings");
    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());

    bindings.write_to_file(out_path.join("opus.rs")).expect("unable to write opus bindings");
}
