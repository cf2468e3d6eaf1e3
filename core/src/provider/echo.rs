//! A minimal `ModelStream` that never calls a tool and echoes the last user
//! message back as assistant text.
//!
//! A concrete provider adapter (OpenAI/Anthropic/Gemini wire formats) lives
//! outside this crate. `cowork-server` still needs something behind the
//! [`ModelStream`] trait to be runnable end to end, so it wires this in by
//! default; a real deployment swaps it for a concrete adapter built against
//! the same trait.

use cowork_protocol::Message;
use futures::stream;

use super::EventStream;
use super::ModelStream;
use super::StepOverrides;
use super::StreamEvent;
use crate::tools::ToolSpec;

pub struct EchoModel;

impl ModelStream for EchoModel {
    fn stream_step(
        &self,
        _model: &str,
        history: &[Message],
        _tools: &[ToolSpec],
        _provider_options: &serde_json::Value,
        _overrides: &StepOverrides,
    ) -> EventStream {
        let reply = history
            .iter()
            .rev()
            .find_map(|m| m.text())
            .unwrap_or_default();
        let events = vec![
            Ok(StreamEvent::TextDelta(reply)),
            Ok(StreamEvent::StepEnd { more: false }),
        ];
        Box::pin(stream::iter(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn echoes_last_user_text() {
        let model = EchoModel;
        let history = vec![Message::user_text("ping")];
        let mut stream = model.stream_step("any", &history, &[], &serde_json::json!({}), &StepOverrides::default());
        let mut out = String::new();
        while let Some(event) = stream.next().await {
            if let StreamEvent::TextDelta(d) = event.expect("event") {
                out.push_str(&d);
            }
        }
        assert_eq!(out, "ping");
    }
}
