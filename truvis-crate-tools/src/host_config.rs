use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// 宿主程序配置，对应工作区根目录下的 `truvis-host.toml`
///
/// 所有字段都有默认值，文件中缺失的 section 或字段使用默认值填充。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub arena: ArenaConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub title: String,
    /// 逻辑像素
    pub width: u32,
    pub height: u32,
}
impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Hello Truvis".to_string(),
            width: 1280,
            height: 780,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresentModeConfig {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// RGBA，每个分量位于 [0, 1]
    pub clear_color: [f32; 4],
    pub present_mode: PresentModeConfig,
    pub frames_in_flight: usize,
    /// 是否开启 Vulkan validation layer
    pub validation: bool,
}
impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.2, 0.4, 1.0],
            present_mode: PresentModeConfig::Fifo,
            frames_in_flight: 2,
            validation: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArenaConfig {
    pub chunk_size: usize,
}
impl Default for ArenaConfig {
    fn default() -> Self {
        Self { chunk_size: 4096 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// off / error / warn / info / debug / trace
    pub level: String,
}
impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
impl LogConfig {
    pub fn level_filter(&self) -> anyhow::Result<log::LevelFilter> {
        self.level.parse().map_err(|_| anyhow::anyhow!("无效的日志级别: {:?}", self.level))
    }
}

impl HostConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content).with_context(|| format!("解析 TOML 配置失败: {:?}", path.as_ref()))
    }

    /// 文件不存在时使用默认配置；文件存在但内容有误时仍然报错
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if !path.as_ref().exists() {
            log::info!(target: "app", "config file {:?} not found, using defaults", path.as_ref());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: HostConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.window.width > 0 && self.window.height > 0,
            "窗口尺寸必须大于 0: {}x{}",
            self.window.width,
            self.window.height
        );
        anyhow::ensure!(
            self.render.clear_color.iter().all(|c| (0.0..=1.0).contains(c)),
            "clear_color 的分量必须位于 [0, 1]: {:?}",
            self.render.clear_color
        );
        anyhow::ensure!(self.render.frames_in_flight > 0, "frames_in_flight 必须大于 0");
        anyhow::ensure!(self.arena.chunk_size > 0, "arena.chunk_size 必须大于 0");
        self.log.level_filter()?;
        Ok(())
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path.as_ref(), content).with_context(|| format!("写入配置文件失败: {:?}", path.as_ref()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_file_parses() {
        let config = HostConfig::from_toml_str(
            r#"
            [window]
            title = "Clear Screen"
            width = 640
            height = 480

            [render]
            clear_color = [1.0, 0.5, 0.0, 1.0]
            present_mode = "mailbox"
            frames_in_flight = 3
            validation = true

            [arena]
            chunk_size = 1024

            [log]
            level = "trace"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Clear Screen");
        assert_eq!((config.window.width, config.window.height), (640, 480));
        assert_eq!(config.render.clear_color, [1.0, 0.5, 0.0, 1.0]);
        assert_eq!(config.render.present_mode, PresentModeConfig::Mailbox);
        assert_eq!(config.render.frames_in_flight, 3);
        assert!(config.render.validation);
        assert_eq!(config.arena.chunk_size, 1024);
        assert_eq!(config.log.level_filter().unwrap(), log::LevelFilter::Trace);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = HostConfig::from_toml_str("[window]\ntitle = \"only title\"\n").unwrap();
        assert_eq!(config.window.title, "only title");
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.render, RenderConfig::default());
        assert_eq!(config.arena.chunk_size, 4096);
        assert_eq!(HostConfig::from_toml_str("").unwrap(), HostConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(HostConfig::from_toml_str("[render]\npresent_mode = \"vsync\"\n").is_err());
        assert!(HostConfig::from_toml_str("[window]\nwidth = 0\n").is_err());
        assert!(HostConfig::from_toml_str("[render]\nclear_color = [0.0, 2.0, 0.0, 1.0]\n").is_err());
        assert!(HostConfig::from_toml_str("[log]\nlevel = \"loud\"\n").is_err());
        assert!(HostConfig::from_toml_str("[window]\nfullscreen = true\n").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let path = std::env::temp_dir().join(format!("truvis-host-missing-{}.toml", std::process::id()));
        assert_eq!(HostConfig::load_or_default(&path).unwrap(), HostConfig::default());
        assert!(HostConfig::from_file(&path).is_err());
    }

    #[test]
    fn saved_file_loads_back() {
        let path = std::env::temp_dir().join(format!("truvis-host-saved-{}.toml", std::process::id()));
        let mut config = HostConfig::default();
        config.window.title = "saved".to_string();
        config.render.present_mode = PresentModeConfig::Immediate;

        config.save_to_file(&path).unwrap();
        let loaded = HostConfig::load_or_default(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded, config);
    }
}
