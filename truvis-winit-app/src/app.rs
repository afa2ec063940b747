use std::path::PathBuf;

use anyhow::Context;
use raw_window_handle::HasDisplayHandle;
use truvis_crate_tools::host_config::{HostConfig, PresentModeConfig};
use truvis_crate_tools::init_log::init_log;
use truvis_crate_tools::resource::TruvisPath;
use truvis_frame::{FrameDriver, FrameStats};
use truvis_gfx::backend::FColor;
use truvis_gfx::settings::{GfxPresentMode, GfxSettings};
use truvis_gfx::vulkan_backend::VulkanBackend;
use truvis_scope::ArenaPool;

use crate::winit_event_source::WinitEventSource;

/// 默认配置文件名，位于工作区根目录
pub const DEFAULT_CONFIG_FILE: &str = "truvis-host.toml";

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!(target: "app", "{}", info);
}

/// 启动参数，命令行中的值覆盖配置文件
#[derive(Debug, Clone, Default)]
pub struct HostOptions {
    pub config_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

pub struct HostApp {}
// 总的 main 函数
impl HostApp {
    /// 整个程序的入口：加载配置，创建窗口与 GPU backend，运行帧循环，退出时按逆序销毁
    pub fn run(options: HostOptions) -> anyhow::Result<FrameStats> {
        let config_path = options.config_path.unwrap_or_else(|| TruvisPath::config_path(DEFAULT_CONFIG_FILE));
        let config = HostConfig::load_or_default(&config_path).context("load host config")?;

        let log_level = match &options.log_level {
            Some(level) => level.parse().map_err(|_| anyhow::anyhow!("invalid log level: {:?}", level))?,
            None => config.log.level_filter()?,
        };
        Self::init_env(log_level);
        log::info!(target: "app", "config: {:?}", config_path);

        // 应用作用域：从启动到退出，帧作用域都嵌套在它之上
        let arena_pool = ArenaPool::new("host", config.arena.chunk_size);
        let app_scope = arena_pool.acquire("app");
        let title = app_scope.alloc_str(&config.window.title).context("allocate window title")?;

        let mut events = WinitEventSource::new()?;
        let window = events
            .create_window(&title.to_string_lossy(), [config.window.width, config.window.height])
            .context("create window")?;
        let physical_size = window.inner_size();

        let settings = Self::gfx_settings(&config);
        let display_handle = window.display_handle().context("query display handle")?.as_raw();
        let mut backend = VulkanBackend::new(&settings, display_handle).context("create gpu device")?;
        let window_handle = match backend.claim_window(window, [physical_size.width, physical_size.height]) {
            Ok(handle) => handle,
            Err(e) => {
                backend.destroy();
                return Err(e).context("claim window");
            }
        };

        let [r, g, b, a] = config.render.clear_color;
        let mut driver = FrameDriver::new(backend, window_handle, &arena_pool, FColor::new(r, g, b, a));
        let result = driver.run(&mut events);

        log::info!(target: "app", "end run.");
        driver.into_backend().destroy();
        drop(app_scope);

        let stats = result.context("frame loop")?;
        log::info!(target: "app", "frame stats: {:?}", stats);
        log::info!(target: "app", "arena stats: {:?}", arena_pool.stats());
        Ok(stats)
    }

    fn init_env(log_level: log::LevelFilter) {
        std::panic::set_hook(Box::new(panic_handler));

        init_log(log_level);

        tracy_client::Client::start();
        tracy_client::set_thread_name!("RenderThread");
    }

    fn gfx_settings(config: &HostConfig) -> GfxSettings {
        GfxSettings {
            app_name: config.window.title.clone(),
            present_mode: match config.render.present_mode {
                PresentModeConfig::Fifo => GfxPresentMode::Fifo,
                PresentModeConfig::Mailbox => GfxPresentMode::Mailbox,
                PresentModeConfig::Immediate => GfxPresentMode::Immediate,
            },
            frames_in_flight: config.render.frames_in_flight,
            validation: config.render.validation,
        }
    }
}
