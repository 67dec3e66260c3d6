//! 事件绑定模块
//!
//! # 设计思路
//!
//! 离屏图片通过 `load` / `error` 两个事件告知加载结果。
//! 本模块提供与 DOM 相同形状的 `bind` / `unbind`：
//! `bind` 返回传入的处理器，`unbind` 以同一个处理器（`Arc` 指针相等）解绑。
//!
//! # 实现思路
//!
//! - 事件目标实现 `EventTarget`，暴露自己的 `Listeners` 表。
//! - `Listeners::dispatch` 先复制出匹配的处理器再调用，
//!   处理器内部再次 `bind` / `unbind` 不会死锁。

use std::sync::{Arc, Mutex};

/// 事件处理器。
pub type Handler<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// 事件监听表。
pub struct Listeners<P> {
    entries: Mutex<Vec<(String, Handler<P>)>>,
}

impl<P> Default for Listeners<P> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<P> Listeners<P> {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, event: &str, handler: Handler<P>) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push((event.to_string(), handler)),
            Err(_) => log::warn!("⚠️ 事件监听表锁已中毒，忽略绑定：{}", event),
        }
    }

    fn remove(&self, event: &str, handler: &Handler<P>) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };

        let Some(pos) = entries
            .iter()
            .position(|(name, bound)| name == event && Arc::ptr_eq(bound, handler))
        else {
            return false;
        };

        entries.remove(pos);
        true
    }

    /// 按绑定顺序调用该事件的全部处理器，返回调用数量。
    pub fn dispatch(&self, event: &str, payload: &P) -> usize {
        let handlers: Vec<Handler<P>> = match self.entries.lock() {
            Ok(entries) => entries
                .iter()
                .filter(|(name, _)| name == event)
                .map(|(_, handler)| Arc::clone(handler))
                .collect(),
            Err(_) => return 0,
        };

        for handler in &handlers {
            handler(payload);
        }

        handlers.len()
    }

    /// 移除全部处理器。
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn count(&self, event: &str) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.iter().filter(|(name, _)| name == event).count())
            .unwrap_or(0)
    }
}

/// 可绑定事件的对象。
pub trait EventTarget {
    type Payload;

    fn listeners(&self) -> &Listeners<Self::Payload>;
}

/// 绑定事件处理器，返回同一个处理器以便后续 `unbind`。
pub fn bind<T: EventTarget>(
    target: &T,
    event: &str,
    handler: Handler<T::Payload>,
) -> Handler<T::Payload> {
    target.listeners().add(event, Arc::clone(&handler));
    handler
}

/// 解绑事件处理器；未找到时返回 `false`。
pub fn unbind<T: EventTarget>(target: &T, event: &str, handler: &Handler<T::Payload>) -> bool {
    target.listeners().remove(event, handler)
}
