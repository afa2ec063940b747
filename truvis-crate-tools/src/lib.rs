//! Truvis 工具集
//!
//! 提供日志初始化、工作区路径、宿主程序配置等通用工具。
//!
//! # TruvisPath
//! 基于工作区根目录的统一路径管理，避免硬编码相对路径。
//!
//! # HostConfig
//! 宿主程序的 TOML 配置：窗口、渲染、内存池、日志。

pub mod host_config;
pub mod init_log;
pub mod resource;
