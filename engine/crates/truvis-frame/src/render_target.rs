use truvis_gfx::backend::{ColorTargetInfo, FColor, LoadOp, StoreOp, TextureHandle};
use truvis_scope::Scope;

use crate::error::FrameError;

/// 在帧作用域中构造清屏用的 color target
///
/// load 为 clear，store 为 store；返回的引用与 frame_scope 同生命周期。
pub fn make_color_target<'s>(
    frame_scope: &'s Scope<'_>,
    texture: TextureHandle,
    r: f32,
    g: f32,
    b: f32,
    a: f32,
) -> Result<&'s mut ColorTargetInfo, FrameError> {
    if texture.is_null() {
        log::error!(target: "render", "make color target: swapchain texture is null");
        return Err(FrameError::InvalidArgument {
            what: "swapchain texture is null",
        });
    }

    let target = frame_scope.alloc(ColorTargetInfo {
        texture,
        load_op: LoadOp::Clear,
        store_op: StoreOp::Store,
        clear_color: FColor::new(r, g, b, a),
    })?;
    log::trace!(target: "render", "color target set: clear=({:.3}, {:.3}, {:.3}, {:.3})", r, g, b, a);

    Ok(target)
}

#[cfg(test)]
mod tests {
    use truvis_scope::ArenaPool;

    use super::*;

    #[test]
    fn clear_and_store_with_given_color() {
        let pool = ArenaPool::new("test", 256);
        let scope = pool.acquire("frame");
        let texture = TextureHandle::from_raw(0x101);

        let target = make_color_target(&scope, texture, 0.0, 0.2, 0.4, 1.0).unwrap();
        assert_eq!(target.texture, texture);
        assert_eq!(target.load_op, LoadOp::Clear);
        assert_eq!(target.store_op, StoreOp::Store);
        assert_eq!(target.clear_color.to_array(), [0.0, 0.2, 0.4, 1.0]);
        assert!(scope.bytes_allocated() >= std::mem::size_of::<ColorTargetInfo>());
    }

    #[test]
    fn null_texture_is_rejected_without_allocating() {
        let pool = ArenaPool::new("test", 256);
        let scope = pool.acquire("frame");

        let err = make_color_target(&scope, TextureHandle::NULL, 1.0, 1.0, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, FrameError::InvalidArgument { .. }));
        assert_eq!(scope.bytes_allocated(), 0);
    }

    #[test]
    fn targets_released_with_scope() {
        let pool = ArenaPool::new("test", 256);
        {
            let scope = pool.acquire("frame");
            make_color_target(&scope, TextureHandle::from_raw(1), 0.0, 0.0, 0.0, 1.0).unwrap();
            assert_eq!(pool.live_scopes(), 1);
        }
        assert_eq!(pool.live_scopes(), 0);
        assert_eq!(pool.stats().bytes_in_use, 0);
    }
}
