//! TUI 日志层
//!
//! 自定义 tracing Layer，将日志发送到 TUI 的日志面板。

use crate::app::AppEvent;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// 发送日志到 TUI 的 Layer
pub struct TuiLogLayer {
    tx: mpsc::Sender<AppEvent>,
}

impl TuiLogLayer {
    pub fn new(tx: mpsc::Sender<AppEvent>) -> Self {
        Self { tx }
    }
}

impl<S> Layer<S> for TuiLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = metadata.level().to_string();

        let mut message = String::new();
        let mut target = None;
        let mut visitor = MessageVisitor {
            message: &mut message,
            target: &mut target,
        };
        event.record(&mut visitor);

        // 经 LogTracer 桥接的事件把原始 target 放在 log.target 字段里
        let target = target.unwrap_or_else(|| metadata.target().to_string());
        if message.is_empty() {
            message.clone_from(&target);
        }

        // 面板跟不上时丢弃，不阻塞工作线程
        let _ = self.tx.try_send(AppEvent::LogMessage {
            level,
            target,
            message,
        });
    }
}

/// 访问者，用于提取事件中的消息字段
struct MessageVisitor<'a> {
    message: &'a mut String,
    target: &'a mut Option<String>,
}

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => *self.message = format!("{value:?}"),
            "log.target" => *self.target = Some(format!("{value:?}")),
            name if self.message.is_empty() && !name.starts_with("log.") => {
                *self.message = format!("{name}={value:?}");
            }
            _ => {}
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => *self.message = value.to_string(),
            "log.target" => *self.target = Some(value.to_string()),
            name if self.message.is_empty() && !name.starts_with("log.") => {
                *self.message = format!("{name}={value}");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_layer_forwards_events() {
        let (tx, mut rx) = mpsc::channel(8);
        let subscriber = tracing_subscriber::registry().with(TuiLogLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("Port {} busy", 5555);
            tracing::info!(file = "a.txt");
        });

        let AppEvent::LogMessage { level, message, .. } = rx.try_recv().unwrap();
        assert_eq!(level, "WARN");
        assert_eq!(message, "Port 5555 busy");

        let AppEvent::LogMessage { message, .. } = rx.try_recv().unwrap();
        assert_eq!(message, "file=a.txt");
    }
}
