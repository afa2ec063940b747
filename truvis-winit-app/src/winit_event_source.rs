use std::time::Duration;

use anyhow::Context;
use truvis_frame::EventSource;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::platform::input_event::InputEvent;
use crate::winit_event_adapter::WinitEventAdapter;

/// 等待 resumed 事件（窗口创建时机）的最大 pump 次数
const MAX_STARTUP_PUMPS: usize = 64;

/// winit 事件回调，只记录状态，不做渲染
#[derive(Default)]
struct HostEventHandler {
    /// 等待在 resumed 中创建的窗口
    pending_window: Option<WindowAttributes>,
    window: Option<Window>,
    create_error: Option<winit::error::OsError>,

    exit_requested: bool,
}

impl ApplicationHandler for HostEventHandler {
    // 建议在这里创建 window
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        log::info!(target: "app", "winit event: resumed");

        if let Some(window_attr) = self.pending_window.take() {
            match event_loop.create_window(window_attr) {
                Ok(window) => self.window = Some(window),
                Err(e) => {
                    self.create_error = Some(e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let input_event = WinitEventAdapter::from_winit_event(&event);
        if input_event.requests_exit() {
            log::info!(target: "app", "exit requested by {:?}", input_event);
            self.exit_requested = true;
            event_loop.exit();
            return;
        }

        if let InputEvent::Resized {
            physical_width,
            physical_height,
        } = input_event
        {
            log::debug!(target: "app", "window resized: {}x{}", physical_width, physical_height);
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!(target: "app", "winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!(target: "app", "loop exiting");
    }

    fn memory_warning(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!(target: "app", "memory warning");
    }
}

/// 基于 winit 的事件来源
///
/// 每次轮询以零超时 pump 一次事件循环，处理完当前所有待处理事件后立即返回。
pub struct WinitEventSource {
    event_loop: EventLoop<()>,
    handler: HostEventHandler,
    exited: bool,
}

// new & init
impl WinitEventSource {
    pub fn new() -> anyhow::Result<Self> {
        let event_loop = EventLoop::new().context("create winit event loop")?;
        Ok(Self {
            event_loop,
            handler: HostEventHandler::default(),
            exited: false,
        })
    }

    /// 创建主窗口；窗口只能在 resumed 回调中创建，因此需要先 pump 几次事件循环
    ///
    /// # param
    /// * logical_size - 窗口的逻辑尺寸
    pub fn create_window(&mut self, title: &str, logical_size: [u32; 2]) -> anyhow::Result<&Window> {
        anyhow::ensure!(self.handler.window.is_none(), "window already created");

        let window_attr = Window::default_attributes()
            .with_title(title)
            .with_inner_size(winit::dpi::LogicalSize::new(logical_size[0], logical_size[1]));
        self.handler.pending_window = Some(window_attr);

        for _ in 0..MAX_STARTUP_PUMPS {
            let status = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.handler);

            if let Some(e) = self.handler.create_error.take() {
                return Err(e).context("create window");
            }
            if self.handler.window.is_some() {
                break;
            }
            if let PumpStatus::Exit(code) = status {
                self.exited = true;
                anyhow::bail!("event loop exited with code {} before the window was created", code);
            }
        }

        let window = self.handler.window.as_ref().context("window was not created by the event loop")?;
        log::info!(
            target: "app",
            "window created: {:?}, physical size {}x{}",
            window.id(),
            window.inner_size().width,
            window.inner_size().height
        );
        Ok(window)
    }
}

// getters
impl WinitEventSource {
    #[inline]
    pub fn window(&self) -> Option<&Window> {
        self.handler.window.as_ref()
    }
}

impl EventSource for WinitEventSource {
    fn poll_and_should_continue(&mut self) -> bool {
        if self.exited {
            return false;
        }

        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.handler) {
            log::info!(target: "app", "event loop exited with code {}", code);
            self.exited = true;
        }
        if self.handler.exit_requested {
            self.exited = true;
        }

        !self.exited
    }
}
