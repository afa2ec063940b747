// 参考 winit::ElementState
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub enum ElementState {
    Pressed,
    Released,
}

// 参考 winit::KeyCode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyCode {
    Escape,

    Other,
}

/// 输入事件类型
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// 用户请求关闭窗口
    CloseRequested,
    /// 窗口已经被销毁
    Destroyed,
    /// 键盘按键事件
    KeyboardInput { key_code: KeyCode, state: ElementState },
    /// 窗口大小改变事件，最小化时为 0x0
    Resized { physical_width: u32, physical_height: u32 },

    Other,
}

impl InputEvent {
    /// 该事件是否意味着主循环应当退出
    pub fn requests_exit(&self) -> bool {
        matches!(
            self,
            InputEvent::CloseRequested
                | InputEvent::Destroyed
                | InputEvent::KeyboardInput {
                    key_code: KeyCode::Escape,
                    state: ElementState::Pressed,
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_events() {
        assert!(InputEvent::CloseRequested.requests_exit());
        assert!(InputEvent::Destroyed.requests_exit());
        assert!(
            InputEvent::KeyboardInput {
                key_code: KeyCode::Escape,
                state: ElementState::Pressed
            }
            .requests_exit()
        );

        assert!(
            !InputEvent::KeyboardInput {
                key_code: KeyCode::Escape,
                state: ElementState::Released
            }
            .requests_exit()
        );
        assert!(
            !InputEvent::Resized {
                physical_width: 0,
                physical_height: 0
            }
            .requests_exit()
        );
        assert!(!InputEvent::Other.requests_exit());
    }
}
