//! Chat memory (C10): a bounded rolling conversation + summary, with
//! CRDT-ish last-writer-wins sync between peers.
//!
//! Grounded on the bounded-log + single-flighted-summarization shape
//! implied by the teacher's `runtime/compact.rs` compaction boundary logic
//! (it folds an over-long transcript into a summary before the next model
//! call); adapted here to the explicit LWW-merge contract in spec §4.10.
//!
//! Retention bound: spec §9 leaves N unspecified ("implementers must pick
//! and document"). This implementation picks **N = 50** recent messages,
//! folding the oldest **10** into the summary once the cap is exceeded —
//! documented in DESIGN.md.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mesh_domain::chat_memory::{ChatMemory, MemoryMessage, MemoryRole};
use mesh_domain::{Error, Result};
use tokio::sync::Mutex;

/// Messages retained in full before folding begins (spec §9 open question c).
pub const RETENTION_CAP: usize = 50;
/// How many of the oldest messages get folded into the summary per pass.
pub const FOLD_BATCH: usize = 10;

/// Produces an updated summary string from the prior summary plus the
/// messages being folded out of the log. `mesh-coordinator` supplies a real
/// implementation backed by an `mesh-providers::LlmProvider`; tests can use
/// a deterministic stub.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prior_summary: &str, folded: &[MemoryMessage]) -> String;
}

/// A no-op summarizer that just concatenates folded content onto the prior
/// summary. Useful as a default when no LLM-backed summarizer is
/// configured, and in tests.
pub struct ConcatSummarizer;

#[async_trait]
impl Summarizer for ConcatSummarizer {
    async fn summarize(&self, prior_summary: &str, folded: &[MemoryMessage]) -> String {
        let mut out = prior_summary.to_string();
        for m in folded {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&m.content);
        }
        out
    }
}

/// Thread-safe owner of a single node's [`ChatMemory`], with a
/// single-flighted background summarization pass triggered once the log
/// exceeds [`RETENTION_CAP`].
pub struct ChatMemoryStore<S: Summarizer + 'static> {
    state: Arc<Mutex<ChatMemory>>,
    summarizer: Arc<S>,
    summarizing: Arc<AtomicBool>,
}

impl<S: Summarizer + 'static> ChatMemoryStore<S> {
    pub fn new(summarizer: Arc<S>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChatMemory::default())),
            summarizer,
            summarizing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn snapshot(&self) -> ChatMemory {
        self.state.lock().await.clone()
    }

    /// `AddMessage(role, content)`: appends and bumps `last_updated_ms`
    /// and `version`. If the log now exceeds [`RETENTION_CAP`], kicks off
    /// an asynchronous fold — at most one in flight at a time.
    pub async fn add_message(&self, role: MemoryRole, content: impl Into<String>, now_ms: i64) {
        {
            let mut mem = self.state.lock().await;
            mem.messages.push(MemoryMessage {
                role,
                content: content.into(),
                timestamp_ms: now_ms,
            });
            mem.last_updated_ms = now_ms;
            mem.version += 1;
        }
        self.maybe_spawn_fold(now_ms);
    }

    fn maybe_spawn_fold(&self, now_ms: i64) {
        let over_cap = {
            // Best-effort check; the real decision is re-verified inside
            // the spawned task under the lock, so a racy read here is fine.
            self.state.try_lock().map(|m| m.messages.len() > RETENTION_CAP).unwrap_or(false)
        };
        if !over_cap {
            return;
        }
        if self
            .summarizing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return; // a fold is already in flight (single-flighted)
        }
        let state = self.state.clone();
        let summarizer = self.summarizer.clone();
        let summarizing = self.summarizing.clone();
        tokio::spawn(async move {
            let (prior_summary, folded) = {
                let mut mem = state.lock().await;
                if mem.messages.len() <= RETENTION_CAP {
                    summarizing.store(false, Ordering::SeqCst);
                    return;
                }
                let folded: Vec<MemoryMessage> =
                    mem.messages.drain(0..FOLD_BATCH.min(mem.messages.len())).collect();
                (mem.summary.clone(), folded)
            };
            let new_summary = summarizer.summarize(&prior_summary, &folded).await;
            {
                let mut mem = state.lock().await;
                mem.summary = new_summary;
                mem.last_updated_ms = now_ms;
            }
            summarizing.store(false, Ordering::SeqCst);
            tracing::debug!(folded = folded.len(), "chat memory folded into summary");
        });
    }

    /// `Merge(other)`: last-writer-wins by `last_updated_ms`. Returns
    /// `true` if `other` was newer and replaced local state wholesale.
    pub async fn merge(&self, other: ChatMemory) -> bool {
        let mut mem = self.state.lock().await;
        if other.last_updated_ms > mem.last_updated_ms {
            *mem = other;
            true
        } else {
            false
        }
    }

    pub async fn to_json(&self) -> Result<String> {
        let mem = self.state.lock().await;
        serde_json::to_string(&*mem).map_err(Error::from)
    }
}

/// `ParseFromJSON`: standalone since it doesn't need a live store.
pub fn parse_from_json(json: &str) -> Result<ChatMemory> {
    serde_json::from_str(json).map_err(Error::from)
}

pub fn to_json(memory: &ChatMemory) -> Result<String> {
    serde_json::to_string(memory).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_message_bumps_version_and_timestamp() {
        let store = ChatMemoryStore::new(Arc::new(ConcatSummarizer));
        store.add_message(MemoryRole::User, "hello", 100).await;
        let mem = store.snapshot().await;
        assert_eq!(mem.version, 1);
        assert_eq!(mem.last_updated_ms, 100);
        assert_eq!(mem.messages.len(), 1);
    }

    #[tokio::test]
    async fn merge_with_newer_remote_replaces_local_wholesale() {
        let store = ChatMemoryStore::new(Arc::new(ConcatSummarizer));
        store.add_message(MemoryRole::User, "m1", 100).await;
        let remote = ChatMemory {
            version: 5,
            last_updated_ms: 200,
            summary: "remote summary".into(),
            messages: vec![
                MemoryMessage {
                    role: MemoryRole::User,
                    content: "m1".into(),
                    timestamp_ms: 100,
                },
                MemoryMessage {
                    role: MemoryRole::Assistant,
                    content: "m2".into(),
                    timestamp_ms: 150,
                },
            ],
        };
        let replaced = store.merge(remote.clone()).await;
        assert!(replaced);
        let mem = store.snapshot().await;
        assert_eq!(mem, remote);
    }

    #[tokio::test]
    async fn merge_with_older_remote_leaves_local_unchanged() {
        let store = ChatMemoryStore::new(Arc::new(ConcatSummarizer));
        store.add_message(MemoryRole::User, "m1", 200).await;
        let stale = ChatMemory {
            version: 1,
            last_updated_ms: 100,
            summary: String::new(),
            messages: vec![],
        };
        let replaced = store.merge(stale).await;
        assert!(!replaced);
        let mem = store.snapshot().await;
        assert_eq!(mem.last_updated_ms, 200);
        assert_eq!(mem.messages.len(), 1);
    }

    #[tokio::test]
    async fn json_round_trips() {
        let mem = ChatMemory {
            version: 2,
            last_updated_ms: 42,
            summary: "s".into(),
            messages: vec![MemoryMessage {
                role: MemoryRole::System,
                content: "c".into(),
                timestamp_ms: 1,
            }],
        };
        let json = to_json(&mem).unwrap();
        let back = parse_from_json(&json).unwrap();
        assert_eq!(mem, back);
    }

    #[tokio::test]
    async fn exceeding_retention_cap_folds_oldest_messages() {
        let store = ChatMemoryStore::new(Arc::new(ConcatSummarizer));
        for i in 0..(RETENTION_CAP + 1) {
            store
                .add_message(MemoryRole::User, format!("m{i}"), i as i64)
                .await;
        }
        // Give the spawned fold task a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let mem = store.snapshot().await;
        assert!(mem.messages.len() <= RETENTION_CAP);
        assert!(!mem.summary.is_empty());
    }
}
