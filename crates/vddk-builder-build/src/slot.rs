//! 単一ビルドスロット
//!
//! 同時に走るビルドパイプラインを 1 つに制限するアドミッション制御。
//! 空きがなければ待たずに即座に拒否します（キューイングはしない）。

use std::sync::{Arc, Mutex, MutexGuard};

/// ビルドスロット（クローンは同じスロットを共有するハンドル）
#[derive(Debug, Clone, Default)]
pub struct BuildSlot {
    busy: Arc<Mutex<bool>>,
}

impl BuildSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// スロットの取得を試みる
    ///
    /// 既に使用中なら `None` を返し、ブロックはしない。
    /// 取得できた場合の `BuildPermit` はドロップ時にスロットを解放する。
    pub fn try_acquire(&self) -> Option<BuildPermit> {
        let mut busy = self.lock();
        if *busy {
            return None;
        }
        *busy = true;
        tracing::debug!("Build slot acquired");

        Some(BuildPermit {
            slot: Arc::clone(&self.busy),
        })
    }

    /// 現在ビルドが進行中かどうか
    pub fn is_busy(&self) -> bool {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        // フラグは bool 1 つなので、パニックで poison されても値は壊れない
        self.busy.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// ビルドスロットの占有権
///
/// `try_acquire` 1 回につき 1 つだけ作られ、ドロップで 1 回だけ解放される。
#[derive(Debug)]
#[must_use = "dropping the permit releases the build slot immediately"]
pub struct BuildPermit {
    slot: Arc<Mutex<bool>>,
}

impl Drop for BuildPermit {
    fn drop(&mut self) {
        let mut busy = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *busy = false;
        tracing::debug!("Build slot released");
    }
}
