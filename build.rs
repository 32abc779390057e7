use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Drop a config template next to the build output
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| "./".to_string());
    let template_path = Path::new(&out_dir).join("../../../tspipe.template.toml");

    let template = r#"# tspipe configuration template
# Copy this file to 'tspipe.toml' and adjust the values

# Log filter used when RUST_LOG is not set
log_level = "info"

# Bytes read per unit by file_reader
read_chunk_size = 1024

# Default output directory of the vbv cell (console when unset)
# output_dir = "./vbv_out"
"#;

    let _ = fs::write(template_path, template);
    println!("cargo:rerun-if-changed=build.rs");
}
