use std::env;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
  // 当存在已提交的生成文件并且没有强制重生成标记时，跳过 protoc 调用
  // Skip the protoc invocation when the committed generated file exists
  // and no force-regeneration flag is set
  let generated = Path::new("src/proto/schedq.rs");
  let force_regen = env::var("FORCE_PROTOC").is_ok() || env::var("PROTOC_REGENERATE").is_ok();
  if generated.exists() && !force_regen {
    // 只在 build.rs 自身变化时重跑
    // Only rerun when build.rs itself changes
    println!("cargo:rerun-if-changed=build.rs");
    return Ok(());
  }
  let mut config = prost_build::Config::new();
  config.out_dir("src/proto");
  config.compile_protos(&["proto/schedq.proto"], &["proto/"])?;
  println!("cargo:rerun-if-changed=proto/schedq.proto");
  Ok(())
}
