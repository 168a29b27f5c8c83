use std::fs;
use std::io::Write;
use std::path::Path;

/// 把 migrations/*.sql 按文件名顺序嵌入为 `MIGRATIONS` 常量
fn main() {
    let migrations_dir = Path::new("migrations");
    let out_dir = std::env::var("OUT_DIR").expect("OUT_DIR 未设置");
    let dest_path = Path::new(&out_dir).join("migrations.rs");

    println!("cargo:rerun-if-changed=migrations/");

    let mut files: Vec<String> = match fs::read_dir(migrations_dir) {
        Ok(dir) => dir
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            // 000_ 开头的文件是手工脚本，不参与自动迁移
            .filter(|name| name.ends_with(".sql") && !name.starts_with("000_"))
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();

    let entries: Vec<String> = files
        .iter()
        .map(|file_name| {
            format!(
                "    (\"{}\", include_str!(concat!(env!(\"CARGO_MANIFEST_DIR\"), \"/migrations/{}\")))",
                file_name.trim_end_matches(".sql"),
                file_name
            )
        })
        .collect();

    let mut f = fs::File::create(&dest_path).expect("无法创建 migrations.rs");
    writeln!(
        f,
        "/// 编译时由 build.rs 生成（跳过 000_ 开头的文件）\n\
         pub const MIGRATIONS: &[(&str, &str)] = &[\n{}\n];",
        entries.join(",\n")
    )
    .expect("无法写入 migrations.rs");
}
