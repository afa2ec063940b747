use winit::event::{KeyEvent, WindowEvent};
use winit::keyboard::PhysicalKey;

use crate::platform::input_event::{ElementState, InputEvent, KeyCode};

pub struct WinitEventAdapter {}
impl WinitEventAdapter {
    pub fn from_winit_event(event: &WindowEvent) -> InputEvent {
        match event {
            WindowEvent::CloseRequested => InputEvent::CloseRequested,
            WindowEvent::Destroyed => InputEvent::Destroyed,
            WindowEvent::KeyboardInput { event, .. } => {
                if let KeyEvent {
                    physical_key: PhysicalKey::Code(key_code),
                    state,
                    ..
                } = event
                {
                    InputEvent::KeyboardInput {
                        key_code: Self::key_from_winit(*key_code),
                        state: Self::state_from_winit(*state),
                    }
                } else {
                    InputEvent::Other
                }
            }
            WindowEvent::Resized(physical_size) => InputEvent::Resized {
                physical_width: physical_size.width,
                physical_height: physical_size.height,
            },
            _ => InputEvent::Other,
        }
    }

    fn key_from_winit(key: winit::keyboard::KeyCode) -> KeyCode {
        match key {
            winit::keyboard::KeyCode::Escape => KeyCode::Escape,
            _ => KeyCode::Other,
        }
    }

    fn state_from_winit(state: winit::event::ElementState) -> ElementState {
        match state {
            winit::event::ElementState::Pressed => ElementState::Pressed,
            winit::event::ElementState::Released => ElementState::Released,
        }
    }
}
