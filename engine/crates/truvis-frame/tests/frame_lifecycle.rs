use truvis_frame::{
    DEFAULT_CLEAR_COLOR, FrameDriver, FrameError, FrameOutcome, acquire_swapchain_texture, make_color_target,
};
use truvis_gfx::backend::{GpuBackend, LoadOp, StoreOp, TextureHandle, WindowHandle};
use truvis_scope::ArenaPool;
use truvis_test_utils::{AcquireResponse, BackendCall, ScriptedBackend, ScriptedEvents, init_test_log};

const WINDOW: WindowHandle = WindowHandle(1);

#[test]
fn normal_frame_clears_and_submits() {
    init_test_log();
    let pool = ArenaPool::new("frame-test", 1024);
    let backend = ScriptedBackend::new().then_acquire(AcquireResponse::texture(1280, 720));
    let mut driver = FrameDriver::new(backend, WINDOW, &pool, DEFAULT_CLEAR_COLOR);

    let outcome = driver.run_frame().unwrap();
    assert_eq!(outcome, FrameOutcome::Submitted { degraded: false });

    let backend = driver.backend();
    assert_eq!(backend.submitted().len(), 1);
    assert!(backend.canceled().is_empty());
    assert_eq!(backend.open_command_buffers(), 0);

    let passes = backend.begin_pass_calls();
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].len(), 1);
    let target = passes[0][0];
    assert_eq!(target.texture, TextureHandle::from_raw(AcquireResponse::DEFAULT_TEXTURE));
    assert_eq!(target.load_op, LoadOp::Clear);
    assert_eq!(target.store_op, StoreOp::Store);
    assert_eq!(target.clear_color.to_array(), [0.0, 0.2, 0.4, 1.0]);

    // pass 在提交之前结束
    let calls = backend.calls();
    let end_pos = calls.iter().position(|call| matches!(call, BackendCall::EndRenderPass(_))).unwrap();
    let submit_pos = calls.iter().position(|call| matches!(call, BackendCall::Submit(_))).unwrap();
    assert!(end_pos < submit_pos);

    assert_eq!(pool.live_scopes(), 0);
    assert_eq!(pool.stats().bytes_in_use, 0);
}

#[test]
fn minimized_frames_are_canceled_not_submitted() {
    init_test_log();
    let pool = ArenaPool::new("frame-test", 1024);
    let backend = ScriptedBackend::new().not_ready_for(3);
    let mut driver = FrameDriver::new(backend, WINDOW, &pool, DEFAULT_CLEAR_COLOR);

    for _ in 0..3 {
        assert_eq!(driver.run_frame().unwrap(), FrameOutcome::SwapchainNotReady);
    }

    let backend = driver.backend();
    assert_eq!(backend.canceled().len(), 3);
    assert!(backend.submitted().is_empty());
    assert!(backend.begin_pass_calls().is_empty());
    assert_eq!(backend.open_command_buffers(), 0);
    assert_eq!(driver.stats().canceled, 3);
    assert_eq!(pool.stats().scopes_acquired, 3);
    assert_eq!(pool.live_scopes(), 0);
}

#[test]
fn missing_command_buffer_skips_without_frame_scope() {
    init_test_log();
    let pool = ArenaPool::new("frame-test", 1024);
    let backend = ScriptedBackend::new().no_command_buffer_for(2);
    let mut driver = FrameDriver::new(backend, WINDOW, &pool, DEFAULT_CLEAR_COLOR);

    assert_eq!(driver.run_frame().unwrap(), FrameOutcome::NoCommandBuffer);
    assert_eq!(driver.run_frame().unwrap(), FrameOutcome::NoCommandBuffer);
    assert_eq!(pool.stats().scopes_acquired, 0);

    let backend = driver.backend();
    assert!(backend.submitted().is_empty());
    assert!(backend.canceled().is_empty());
    assert!(!backend.calls().iter().any(|call| matches!(call, BackendCall::WaitAndAcquire { .. })));

    // 之后恢复正常
    assert_eq!(driver.run_frame().unwrap(), FrameOutcome::Submitted { degraded: false });
    assert_eq!(pool.stats().scopes_acquired, 1);
    assert_eq!(driver.stats().skipped_no_command_buffer, 2);
}

#[test]
fn acquire_failure_cancels_and_is_fatal() {
    init_test_log();
    let pool = ArenaPool::new("frame-test", 1024);
    let backend = ScriptedBackend::new().then_acquire(AcquireResponse::Fail("device lost".to_string()));
    let mut driver = FrameDriver::new(backend, WINDOW, &pool, DEFAULT_CLEAR_COLOR);

    let err = driver.run_frame().unwrap_err();
    assert!(matches!(&err, FrameError::SwapchainAcquire { backend_error } if backend_error == "device lost"));
    assert!(err.is_fatal());

    let backend = driver.backend();
    assert_eq!(backend.canceled().len(), 1);
    assert!(backend.submitted().is_empty());
    assert_eq!(backend.open_command_buffers(), 0);
    assert_eq!(pool.live_scopes(), 0);
}

#[test]
fn begin_pass_failure_still_submits() {
    init_test_log();
    let pool = ArenaPool::new("frame-test", 1024);
    let backend = ScriptedBackend::new().fail_begin_pass_at(0, "attachment format unsupported");
    let mut driver = FrameDriver::new(backend, WINDOW, &pool, DEFAULT_CLEAR_COLOR);

    assert_eq!(driver.run_frame().unwrap(), FrameOutcome::Submitted { degraded: true });
    assert_eq!(driver.run_frame().unwrap(), FrameOutcome::Submitted { degraded: false });

    let backend = driver.backend();
    assert_eq!(backend.submitted().len(), 2);
    let end_passes = backend.calls().iter().filter(|call| matches!(call, BackendCall::EndRenderPass(_))).count();
    assert_eq!(end_passes, 1);
    assert_eq!(driver.stats().degraded_passes, 1);
}

#[test]
fn submit_failure_reports_backend_error() {
    init_test_log();
    let pool = ArenaPool::new("frame-test", 1024);
    let backend = ScriptedBackend::new().fail_submit_at(1, "queue submit: ERROR_DEVICE_LOST");
    let mut driver = FrameDriver::new(backend, WINDOW, &pool, DEFAULT_CLEAR_COLOR);
    let mut events = ScriptedEvents::continue_for(10);

    let err = driver.run(&mut events).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.backend_error(), Some("queue submit: ERROR_DEVICE_LOST"));
    assert!(err.to_string().contains("ERROR_DEVICE_LOST"));

    // 第二帧失败后立即停止
    assert_eq!(events.polls(), 2);
    assert_eq!(driver.backend().submitted().len(), 2);
    assert_eq!(driver.stats().submitted, 1);
    assert_eq!(pool.live_scopes(), 0);
}

#[test]
fn run_stops_as_soon_as_events_say_so() {
    init_test_log();
    let pool = ArenaPool::new("frame-test", 1024);
    let backend = ScriptedBackend::new().not_ready_for(1).no_command_buffer_for(1);
    let mut driver = FrameDriver::new(backend, WINDOW, &pool, DEFAULT_CLEAR_COLOR);
    let mut events = ScriptedEvents::continue_for(4);

    let stats = driver.run(&mut events).unwrap();
    assert_eq!(events.polls(), 5);
    assert_eq!(stats.polls, 5);
    assert_eq!(stats.skipped_no_command_buffer, 1);
    assert_eq!(stats.canceled, 1);
    assert_eq!(stats.submitted, 2);

    let backend = driver.into_backend();
    assert_eq!(backend.lifecycle_violations(), 0);
    assert_eq!(backend.open_command_buffers(), 0);
}

#[test]
fn zero_iterations_when_first_poll_stops() {
    let pool = ArenaPool::new("frame-test", 1024);
    let mut driver = FrameDriver::new(ScriptedBackend::new(), WINDOW, &pool, DEFAULT_CLEAR_COLOR);
    let mut events = ScriptedEvents::continue_for(0);

    driver.run(&mut events).unwrap();
    assert!(driver.backend().calls().is_empty());
    assert_eq!(pool.stats().scopes_acquired, 0);
}

#[test]
fn acquire_writes_dimensions_through_frame_scope() {
    let pool = ArenaPool::new("frame-test", 1024);
    let mut backend = ScriptedBackend::new().then_acquire(AcquireResponse::Texture {
        texture: 0x42,
        width: 640,
        height: 480,
    });
    let cmd = backend.acquire_command_buffer().unwrap();

    let scope = pool.acquire("frame");
    let texture = acquire_swapchain_texture(&mut backend, cmd, WINDOW, &scope).unwrap().unwrap();
    assert_eq!(texture.texture, TextureHandle::from_raw(0x42));
    assert_eq!((texture.width, texture.height), (640, 480));
    // 一个指针槽位加两个 u32 槽位
    assert!(scope.bytes_allocated() >= size_of::<usize>() + 2 * size_of::<u32>());

    // 纹理获取成功后 cmd 仍在录制
    assert_eq!(backend.open_command_buffers(), 1);
    assert!(backend.submit_command_buffer(cmd));
}

#[test]
fn color_target_rejects_null_texture() {
    let pool = ArenaPool::new("frame-test", 1024);
    let scope = pool.acquire("frame");
    let err = make_color_target(&scope, TextureHandle::NULL, 0.0, 0.2, 0.4, 1.0).unwrap_err();
    assert!(matches!(err, FrameError::InvalidArgument { .. }));
}
