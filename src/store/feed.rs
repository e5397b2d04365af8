use std::{collections::HashMap, sync::Mutex};

use tokio::sync::watch;

/// Per-owner revision counters used to signal "something changed, re-read".
#[derive(Debug, Default)]
pub struct ChangeFeed {
    senders: Mutex<HashMap<String, watch::Sender<u64>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, owner: &str) -> watch::Receiver<u64> {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders
            .entry(owner.to_owned())
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    pub fn notify(&self, owner: &str) {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = senders.get(owner) {
            if tx.receiver_count() == 0 {
                senders.remove(owner);
            } else {
                tx.send_modify(|rev| *rev += 1);
            }
        }
    }
}
