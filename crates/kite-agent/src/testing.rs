//! Test doubles shared by the unit tests of this crate

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use kite_ai::{ChatRequest, StreamEvent, StreamEventStream, Usage};
use parking_lot::Mutex;

use crate::handlers::{FileSystem, HandlerResult, Shell};
use crate::transport::Transport;

/// Shell that records every command instead of running it
#[derive(Default)]
pub(crate) struct RecordingShell {
    commands: Mutex<Vec<String>>,
}

impl RecordingShell {
    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl Shell for RecordingShell {
    async fn exec(&self, command: &str, _timeout: Option<std::time::Duration>) -> HandlerResult<String> {
        self.commands.lock().push(command.to_string());
        Ok(format!("ran {}", command))
    }
}

/// In-memory file system that counts writes
#[derive(Default)]
pub(crate) struct MemoryFs {
    files: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
    reads: AtomicUsize,
}

impl MemoryFs {
    pub(crate) fn with_files(files: &[(&str, &str)]) -> Self {
        let fs = Self::default();
        {
            let mut map = fs.files.lock();
            for (path, content) in files {
                map.insert(path.to_string(), content.to_string());
            }
        }
        fs
    }

    pub(crate) fn get(&self, path: &str) -> Option<String> {
        self.files.lock().get(path).cloned()
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub(crate) fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSystem for MemoryFs {
    async fn read_to_string(&self, path: &str) -> HandlerResult<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(path))
    }

    async fn write(&self, path: &str, content: &str) -> HandlerResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.files.lock().insert(path.to_string(), content.to_string());
        Ok(())
    }
}

/// One scripted model reply
pub(crate) enum Reply {
    Events(Vec<StreamEvent>),
    /// Never produces an event; only cancellation ends the turn
    Hang,
    Fail(kite_ai::Error),
}

impl Reply {
    /// Visible text, delivered in small chunks
    pub(crate) fn text(text: &str) -> Self {
        Self::with_reasoning("", text)
    }

    pub(crate) fn with_reasoning(reasoning: &str, text: &str) -> Self {
        let mut events = Vec::new();
        if !reasoning.is_empty() {
            events.push(StreamEvent::ReasoningDelta {
                delta: reasoning.to_string(),
            });
        }
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(7) {
            events.push(StreamEvent::ContentDelta {
                delta: chunk.iter().collect(),
            });
        }
        events.push(StreamEvent::Usage {
            usage: Usage {
                prompt_tokens: 100,
                completion_tokens: 10,
                total_tokens: 110,
            },
        });
        events.push(StreamEvent::Done {
            finish_reason: Some("stop".into()),
        });
        Self::Events(events)
    }
}

/// Transport that replays scripted replies and records every request
pub(crate) struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockTransport {
    pub(crate) fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ChatRequest) -> kite_ai::Result<StreamEventStream> {
        self.requests.lock().push(request.clone());
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Reply::text("done"));
        match reply {
            Reply::Events(events) => Ok(Box::pin(futures::stream::iter(events))),
            Reply::Hang => Ok(Box::pin(futures::stream::pending())),
            Reply::Fail(e) => Err(e),
        }
    }
}
