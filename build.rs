use std::{env, path::Path};

const WATCHED_VARIABLES: [&str; 3] = ["FFMPEG_DIR", "PKG_CONFIG_PATH", "VCPKG_ROOT"];

fn main() {
    for variable in WATCHED_VARIABLES {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    // Unix builds find FFmpeg through pkg-config; only Windows needs a hint.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") || env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    match env::var("VCPKG_ROOT") {
        Ok(root) => {
            let installed = Path::new(&root).join("installed").join("x64-windows");
            if installed.exists() {
                println!(
                    "cargo:warning=timeloop: FFMPEG_DIR is unset; try FFMPEG_DIR={}",
                    installed.display()
                );
            } else {
                println!("cargo:warning=timeloop: no vcpkg FFmpeg under {}", installed.display());
            }
        }
        Err(_) => println!(
            "cargo:warning=timeloop: set FFMPEG_DIR to an FFmpeg install (e.g. `vcpkg install ffmpeg`)"
        ),
    }
}
