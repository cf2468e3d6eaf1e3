//! A scripted [`ModelStream`] used by turn-loop tests. Real adapters (one
//! per `ModelProviderInfo` entry) live outside this crate's test-only
//! surface; this one exists so `turn.rs` can be exercised without a
//! network call.

use std::sync::Mutex;

use cowork_protocol::Message;
use futures::stream;

use super::EventStream;
use super::ModelStream;
use super::StepOverrides;
use super::StreamEvent;
use crate::tools::ToolSpec;

/// Replays a fixed sequence of steps, one `Vec<StreamEvent>` per call to
/// [`ModelStream::stream_step`], regardless of the history passed in.
pub struct ScriptedModel {
    steps: Mutex<std::vec::IntoIter<Vec<StreamEvent>>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter()),
        }
    }
}

impl ModelStream for ScriptedModel {
    fn stream_step(
        &self,
        _model: &str,
        _history: &[Message],
        _tools: &[ToolSpec],
        _provider_options: &serde_json::Value,
        _overrides: &StepOverrides,
    ) -> EventStream {
        let step = self
            .steps
            .lock()
            .expect("scripted model lock poisoned")
            .next()
            .unwrap_or_else(|| vec![StreamEvent::StepEnd { more: false }]);
        Box::pin(stream::iter(step.into_iter().map(Ok)))
    }
}
