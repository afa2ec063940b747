use proptest::prelude::*;
use truvis_frame::{DEFAULT_CLEAR_COLOR, EventSource, FrameDriver};
use truvis_gfx::backend::WindowHandle;
use truvis_scope::ArenaPool;
use truvis_test_utils::{AcquireResponse, ScriptedBackend, ScriptedEvents};

#[derive(Debug, Clone, Copy)]
enum FrameScript {
    Normal,
    NoCommandBuffer,
    NotReady,
    PassFails,
}

fn frame_script() -> impl Strategy<Value = FrameScript> {
    prop_oneof![
        Just(FrameScript::Normal),
        Just(FrameScript::NoCommandBuffer),
        Just(FrameScript::NotReady),
        Just(FrameScript::PassFails),
    ]
}

/// 按帧脚本构造 backend；每一帧都有确定的行为
fn scripted_backend(frames: &[FrameScript]) -> ScriptedBackend {
    let mut backend = ScriptedBackend::new();
    let mut passes = 0;
    for frame in frames {
        backend = match frame {
            FrameScript::Normal => {
                passes += 1;
                backend.then_acquire(AcquireResponse::texture(800, 600))
            }
            FrameScript::NoCommandBuffer => backend,
            FrameScript::NotReady => backend.then_acquire(AcquireResponse::NotReady),
            FrameScript::PassFails => {
                passes += 1;
                backend.then_acquire(AcquireResponse::texture(800, 600)).fail_begin_pass_at(passes - 1, "scripted")
            }
        };
    }
    backend
}

proptest! {
    /// 每个获取到的命令缓冲恰好提交或取消一次，且循环在事件来源返回 false 后立即结束
    #[test]
    fn every_command_buffer_ends_exactly_once(frames in prop::collection::vec(frame_script(), 0..24)) {
        // 命令缓冲脚本需要与帧顺序对齐，逐帧驱动
        let pool = ArenaPool::new("prop", 512);
        let mut driver = FrameDriver::new(scripted_backend(&frames), WindowHandle(1), &pool, DEFAULT_CLEAR_COLOR);
        let mut events = ScriptedEvents::continue_for(frames.len());

        for frame in &frames {
            if matches!(frame, FrameScript::NoCommandBuffer) {
                let backend = std::mem::take(driver.backend_mut());
                *driver.backend_mut() = backend.no_command_buffer_for(1);
            }
            prop_assert!(events.poll_and_should_continue());
            driver.run_frame().unwrap();
        }
        prop_assert!(!events.poll_and_should_continue());

        let backend = driver.backend();
        prop_assert_eq!(backend.lifecycle_violations(), 0);
        prop_assert_eq!(backend.open_command_buffers(), 0);
        prop_assert_eq!(
            backend.submitted().len() + backend.canceled().len(),
            backend.acquired_command_buffers()
        );

        let expected_skips = frames.iter().filter(|f| matches!(f, FrameScript::NoCommandBuffer)).count();
        let expected_cancels = frames.iter().filter(|f| matches!(f, FrameScript::NotReady)).count();
        prop_assert_eq!(driver.stats().skipped_no_command_buffer as usize, expected_skips);
        prop_assert_eq!(backend.canceled().len(), expected_cancels);
        prop_assert_eq!(pool.live_scopes(), 0);
        prop_assert_eq!(pool.stats().scopes_acquired as usize, frames.len() - expected_skips);
    }

    /// 事件来源在第 n 次轮询返回 false 时，恰好渲染 n - 1 帧
    #[test]
    fn run_renders_one_frame_per_true_poll(n in 0usize..64) {
        let pool = ArenaPool::new("prop", 512);
        let mut driver = FrameDriver::new(ScriptedBackend::new(), WindowHandle(1), &pool, DEFAULT_CLEAR_COLOR);
        let mut events = ScriptedEvents::continue_for(n);

        let stats = driver.run(&mut events).unwrap();
        prop_assert_eq!(events.polls(), n + 1);
        prop_assert_eq!(stats.polls as usize, n + 1);
        prop_assert_eq!(stats.submitted as usize, n);
        prop_assert_eq!(driver.backend().acquired_command_buffers(), n);
    }
}
