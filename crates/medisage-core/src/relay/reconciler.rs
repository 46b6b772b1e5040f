//! Snapshot-to-delta reconciliation
//!
//! The upstream does not say whether a text field is the whole reply so far,
//! a fresh increment, or a repeat of something already sent. The reconciler
//! classifies each snapshot against the previous one and yields only the text
//! the client has not seen yet.

/// Per-session reconciliation state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaReconciler {
    /// Upstream view of the reply, used for classification
    last_snapshot: String,
    /// Concatenation of every emitted delta
    accumulated_text: String,
}

impl DeltaReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile one snapshot, returning the delta to emit (if any).
    ///
    /// 1. no previous snapshot: the whole snapshot is new
    /// 2. shared prefix: cumulative snapshot, emit the suffix past the prefix
    /// 3. previous snapshot starts with this one: stale repeat, emit nothing
    /// 4. otherwise: incremental chunk, emit it whole and append it
    pub fn reconcile(&mut self, snapshot: &str) -> Option<String> {
        let delta = if self.last_snapshot.is_empty() {
            self.last_snapshot = snapshot.to_string();
            snapshot.to_string()
        } else {
            let lcp = common_prefix_len(&self.last_snapshot, snapshot);
            if lcp > 0 {
                self.last_snapshot = snapshot.to_string();
                snapshot[lcp..].to_string()
            } else if self.last_snapshot.starts_with(snapshot) {
                String::new()
            } else {
                self.last_snapshot.push_str(snapshot);
                snapshot.to_string()
            }
        };

        if delta.is_empty() {
            return None;
        }
        self.accumulated_text.push_str(&delta);
        Some(delta)
    }

    /// Everything emitted so far
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn last_snapshot(&self) -> &str {
        &self.last_snapshot
    }

    pub fn into_text(self) -> String {
        self.accumulated_text
    }
}

/// Length in bytes of the longest common prefix, on a char boundary
fn common_prefix_len(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, ca), cb)| ca != cb)
        .map(|((idx, _), _)| idx)
        .unwrap_or_else(|| a.len().min(b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(snapshots: &[&str]) -> (Vec<Option<String>>, DeltaReconciler) {
        let mut reconciler = DeltaReconciler::new();
        let deltas = snapshots.iter().map(|s| reconciler.reconcile(s)).collect();
        (deltas, reconciler)
    }

    #[test]
    fn test_cumulative_snapshots() {
        let (deltas, state) = run(&["你", "你好", "你好，请"]);
        assert_eq!(
            deltas,
            vec![Some("你".into()), Some("好".into()), Some("，请".into())]
        );
        assert_eq!(state.accumulated_text(), "你好，请");
    }

    #[test]
    fn test_shrinking_snapshot_emits_nothing() {
        let (deltas, state) = run(&["你好", "你"]);
        assert_eq!(deltas, vec![Some("你好".into()), None]);
        assert_eq!(state.accumulated_text(), "你好");
        assert_eq!(state.last_snapshot(), "你");
    }

    #[test]
    fn test_disjoint_incremental_chunks() {
        let (deltas, state) = run(&["A", "B"]);
        assert_eq!(deltas, vec![Some("A".into()), Some("B".into())]);
        assert_eq!(state.accumulated_text(), "AB");
        assert_eq!(state.last_snapshot(), "AB");
    }

    #[test]
    fn test_exact_duplicate_emits_nothing() {
        let (deltas, state) = run(&["您好", "您好"]);
        assert_eq!(deltas, vec![Some("您好".into()), None]);
        assert_eq!(state.accumulated_text(), "您好");
    }

    #[test]
    fn test_empty_snapshot_is_stale() {
        let (deltas, state) = run(&["abc", ""]);
        assert_eq!(deltas, vec![Some("abc".into()), None]);
        assert_eq!(state.last_snapshot(), "abc");
    }

    #[test]
    fn test_divergent_snapshot_emits_suffix() {
        let (deltas, state) = run(&["abc", "abX"]);
        assert_eq!(deltas, vec![Some("abc".into()), Some("X".into())]);
        assert_eq!(state.last_snapshot(), "abX");
        assert_eq!(state.accumulated_text(), "abcX");
    }

    #[test]
    fn test_prefix_length_respects_char_boundaries() {
        // 你 and 佢 share their first UTF-8 byte
        assert_eq!(common_prefix_len("你", "佢"), 0);
        assert_eq!(common_prefix_len("问诊", "问题"), "问".len());
        assert_eq!(common_prefix_len("abc", "abcdef"), 3);
        assert_eq!(common_prefix_len("", "x"), 0);
    }

    #[test]
    fn test_deltas_concatenate_to_accumulated_text() {
        let sequences: &[&[&str]] = &[
            &["你", "你好", "你好，请", "你好，请问"],
            &["A", "B", "C"],
            &["hello", "hel", "hello world", "!"],
            &["abc", "abX", "Y", "abXYz"],
            &["", "x", "", "xy"],
            &["患者", "者", "患者主诉", "腹痛"],
        ];

        for snapshots in sequences {
            let (deltas, state) = run(snapshots);
            let joined: String = deltas.into_iter().flatten().collect();
            assert_eq!(joined, state.accumulated_text(), "sequence {:?}", snapshots);
        }
    }
}
