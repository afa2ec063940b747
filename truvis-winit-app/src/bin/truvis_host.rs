use std::path::PathBuf;

use clap::Parser;
use truvis_winit_app::app::{HostApp, HostOptions};

/// 打开一个窗口，每帧用配置中的颜色清屏
#[derive(Debug, Parser)]
#[command(name = "truvis-host", version)]
struct Cli {
    /// 配置文件路径，默认为工作区根目录下的 truvis-host.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// 日志级别（off / error / warn / info / debug / trace），覆盖配置文件
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    HostApp::run(HostOptions {
        config_path: cli.config,
        log_level: cli.log_level,
    })?;
    Ok(())
}
