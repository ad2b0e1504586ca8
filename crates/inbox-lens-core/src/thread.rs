//! Conversation thread reconstruction.
//!
//! # Algorithm
//!
//! 1. Index every email by its `Message-ID`, and index which emails cite each
//!    message id through `References` / `In-Reply-To`.
//! 2. For each unvisited email, walk the citation graph in both directions
//!    (parents it cites, children citing it) with an explicit worklist. Each
//!    walk yields one header-linked group.
//! 3. Groups of one are regrouped by normalized subject (`Re:`/`Fwd:`/`Fw:`
//!    prefixes stripped, lowercased). Multi-email groups are never merged by
//!    subject.
//! 4. Members are sorted ascending by date (missing dates are the epoch, ties
//!    keep input order); the last member represents the thread.
//! 5. Threads are ordered newest representative first.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::models::{Email, Thread, ThreadMembership};

fn subject_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?:(?:re|fwd|fw):\s*)+").expect("static regex"))
}

/// Subject key used to group unlinked emails.
///
/// ```rust
/// use inbox_lens_core::thread::normalize_subject;
///
/// assert_eq!(normalize_subject("Re: FWD: re:Hello "), "hello");
/// ```
pub fn normalize_subject(subject: &str) -> String {
    subject_prefix()
        .replace(subject.trim(), "")
        .trim()
        .to_lowercase()
}

/// Group a flat email collection into conversation threads.
///
/// Every input email lands in exactly one thread. The result depends only
/// on the input, so calling it twice yields identical groupings.
pub fn build_threads(emails: &[Email]) -> Vec<Thread> {
    let n = emails.len();
    let mut by_message_id: HashMap<&str, usize> = HashMap::new();
    let mut cited_by: HashMap<&str, Vec<usize>> = HashMap::new();

    for (idx, email) in emails.iter().enumerate() {
        let mid = email.message_id.trim();
        if !mid.is_empty() {
            by_message_id.insert(mid, idx);
        }
        for cited in email.cited_ids() {
            cited_by.entry(cited).or_default().push(idx);
        }
    }

    let adjacency: Vec<Vec<usize>> = emails
        .iter()
        .map(|email| {
            let mut edges: Vec<usize> = email
                .cited_ids()
                .filter_map(|mid| by_message_id.get(mid).copied())
                .collect();
            let mid = email.message_id.trim();
            if !mid.is_empty() {
                if let Some(children) = cited_by.get(mid) {
                    edges.extend(children.iter().copied());
                }
            }
            edges
        })
        .collect();

    let mut visited = vec![false; n];
    let mut linked: Vec<Vec<usize>> = Vec::new();
    let mut singles: Vec<usize> = Vec::new();

    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut group = Vec::new();
        let mut stack = vec![start];
        visited[start] = true;
        while let Some(idx) = stack.pop() {
            group.push(idx);
            for &next in &adjacency[idx] {
                if !visited[next] {
                    visited[next] = true;
                    stack.push(next);
                }
            }
        }
        if group.len() > 1 {
            linked.push(group);
        } else {
            singles.push(start);
        }
    }

    let mut subject_keys: HashMap<String, usize> = HashMap::new();
    let mut by_subject: Vec<Vec<usize>> = Vec::new();
    for idx in singles {
        let key = normalize_subject(&emails[idx].subject);
        match subject_keys.get(&key) {
            Some(&slot) => by_subject[slot].push(idx),
            None => {
                subject_keys.insert(key, by_subject.len());
                by_subject.push(vec![idx]);
            }
        }
    }

    let timestamps: Vec<i64> = emails.iter().map(Email::timestamp_millis).collect();
    let linked_count = linked.len();
    let subject_count = by_subject.len();

    let mut groups: Vec<Vec<usize>> = linked.into_iter().chain(by_subject).collect();
    for group in &mut groups {
        group.sort_by_key(|&idx| (timestamps[idx], idx));
    }
    groups.sort_by(|a, b| {
        let last_a = a.last().map(|&i| timestamps[i]).unwrap_or(0);
        let last_b = b.last().map(|&i| timestamps[i]).unwrap_or(0);
        last_b.cmp(&last_a)
    });

    debug!(
        emails = n,
        threads = groups.len(),
        linked = linked_count,
        by_subject = subject_count,
        "threads built"
    );

    groups
        .into_iter()
        .map(|group| Thread {
            emails: group.into_iter().map(|idx| emails[idx].clone()).collect(),
        })
        .collect()
}

/// `representativeId -> member ids` for each thread.
pub fn thread_membership(threads: &[Thread]) -> ThreadMembership {
    threads
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| {
            (
                t.representative_id().to_string(),
                t.member_ids().map(str::to_string).collect(),
            )
        })
        .collect()
}

/// Ids of every thread representative, in thread order.
pub fn representative_ids(threads: &[Thread]) -> Vec<String> {
    threads
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| t.representative_id().to_string())
        .collect()
}

/// Check that `threads` partition `emails`: every id present exactly once.
pub fn is_partition(emails: &[Email], threads: &[Thread]) -> bool {
    let total: usize = threads.iter().map(Thread::len).sum();
    if total != emails.len() {
        return false;
    }
    let mut seen = HashSet::new();
    threads
        .iter()
        .flat_map(|t| t.member_ids())
        .all(|id| seen.insert(id))
        && emails.iter().all(|e| seen.contains(e.id.as_str()))
}
