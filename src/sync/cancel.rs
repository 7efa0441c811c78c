// 取消令牌 - 基于 tokio::sync::watch
//
// CancelHandle 由拥有方持有；handle 调用 cancel() 或被 drop 后，
// 所有派生的 CancelToken 都视为已取消

use tokio::sync::watch;

/// 拥有方持有的取消句柄
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

/// 沿调用链传递的取消令牌
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: Some(self.sender.subscribe()),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// 永不取消的令牌，用于一次性的手动刷新
    pub fn none() -> Self {
        Self { receiver: None }
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.receiver {
            None => false,
            // 发送端已 drop 同样视为取消
            Some(rx) => *rx.borrow() || rx.has_changed().is_err(),
        }
    }

    /// 等待取消发生
    pub async fn cancelled(&self) {
        let Some(rx) = &self.receiver else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_propagates_to_tokens() {
        let handle = CancelHandle::new();
        let token = handle.token();
        let cloned = token.clone();
        assert!(!token.is_cancelled());

        let waiter = tokio::spawn(async move { cloned.cancelled().await });
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(token.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels() {
        let handle = CancelHandle::new();
        let token = handle.token();
        drop(handle);
        assert!(token.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .unwrap();
    }

    #[test]
    fn test_none_token_never_cancels() {
        assert!(!CancelToken::none().is_cancelled());
    }
}
