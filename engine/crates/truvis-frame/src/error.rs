use truvis_scope::ArenaError;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// backend 获取 swapchain 纹理失败，命令缓冲已被取消
    #[error("wait and acquire swapchain texture failed: {backend_error}")]
    SwapchainAcquire { backend_error: String },

    /// 提交失败，无法恢复
    #[error("submit command buffer failed: {backend_error}")]
    Submit { backend_error: String },

    #[error("invalid argument: {what}")]
    InvalidArgument { what: &'static str },

    #[error(transparent)]
    Arena(#[from] ArenaError),
}

impl FrameError {
    /// 是否需要终止主循环
    ///
    /// InvalidArgument 属于调用方的错误，修正参数即可继续
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FrameError::InvalidArgument { .. })
    }

    /// backend 报告的最后一条错误信息
    pub fn backend_error(&self) -> Option<&str> {
        match self {
            FrameError::SwapchainAcquire { backend_error } | FrameError::Submit { backend_error } => {
                Some(backend_error)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_error_carries_backend_message() {
        let err = FrameError::Submit {
            backend_error: "device lost".to_string(),
        };
        assert!(err.is_fatal());
        assert_eq!(err.backend_error(), Some("device lost"));
        assert_eq!(err.to_string(), "submit command buffer failed: device lost");
    }

    #[test]
    fn invalid_argument_is_not_fatal() {
        let err = FrameError::InvalidArgument {
            what: "swapchain texture is null",
        };
        assert!(!err.is_fatal());
        assert_eq!(err.backend_error(), None);
    }
}
