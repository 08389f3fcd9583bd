//! Audit Suspension
//!
//! Node stores stamp auditable timestamps and actors automatically on create
//! and mutate. Migration has to overwrite those fields with the values
//! captured from the source node, which only sticks while the automatic
//! stamping is off. `AuditSwitch` scopes that suspension to a block: `pause`
//! returns a guard, and stamping resumes when the last outstanding guard
//! drops. The switch is shared state on the store, not a global.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Suspension counter for automatic auditable-property management.
#[derive(Debug, Default)]
pub struct AuditSwitch {
    suspensions: AtomicUsize,
}

impl AuditSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while no pause guard is outstanding.
    pub fn is_enabled(&self) -> bool {
        self.suspensions.load(Ordering::SeqCst) == 0
    }

    /// Suspend automatic stamping until the returned guard is dropped.
    /// Pauses nest.
    pub fn pause(&self) -> AuditPause<'_> {
        self.suspensions.fetch_add(1, Ordering::SeqCst);
        AuditPause { switch: self }
    }
}

/// RAII guard for a suspended audit switch.
#[derive(Debug)]
pub struct AuditPause<'a> {
    switch: &'a AuditSwitch,
}

impl Drop for AuditPause<'_> {
    fn drop(&mut self) {
        self.switch.suspensions.fetch_sub(1, Ordering::SeqCst);
    }
}
