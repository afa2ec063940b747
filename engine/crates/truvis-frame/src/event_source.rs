/// 平台事件来源
///
/// 每次循环迭代开始时调用一次；处理完当前所有待处理事件后，
/// 返回 false 表示收到退出请求（例如窗口关闭），循环应当立即结束。
pub trait EventSource {
    fn poll_and_should_continue(&mut self) -> bool;
}

impl<E: EventSource + ?Sized> EventSource for &mut E {
    fn poll_and_should_continue(&mut self) -> bool {
        (**self).poll_and_should_continue()
    }
}
