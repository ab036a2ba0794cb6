//! Interrupt arbitration: a small priority queue plus the periodic VBlank NMI timer.
//!
//! Servicing itself (stack frame, vector load) lives on the CPU; this module only
//! decides *what* gets serviced and in which order.

use crate::debug_flags;
use std::sync::atomic::AtomicU32;

pub const QUEUE_CAPACITY: usize = 16;
pub const DEFAULT_NMI_PERIOD: u32 = 1364;

/// Ordered by priority: `Reset < Nmi < Brk < Irq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InterruptKind {
    Reset,
    Nmi,
    Brk,
    Irq,
}

impl InterruptKind {
    pub fn vector(self) -> u16 {
        match self {
            InterruptKind::Reset => 0xFFFC,
            InterruptKind::Nmi => 0xFFEA,
            InterruptKind::Brk => 0xFFE6,
            InterruptKind::Irq => 0xFFEE,
        }
    }

    pub fn cycles(self) -> u32 {
        match self {
            InterruptKind::Reset => 8,
            _ => 7,
        }
    }

    /// IRQ and BRK wait while the interrupt-disable flag is set.
    pub fn is_maskable(self) -> bool {
        matches!(self, InterruptKind::Brk | InterruptKind::Irq)
    }
}

static QUEUE_FULL_LOG: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Default)]
pub struct InterruptQueue {
    pending: Vec<InterruptKind>,
}

impl InterruptQueue {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(QUEUE_CAPACITY),
        }
    }

    /// Priority-ordered insert. Re-requesting a queued kind coalesces.
    pub fn enqueue(&mut self, kind: InterruptKind) -> bool {
        if self.pending.contains(&kind) {
            return true;
        }
        if self.pending.len() >= QUEUE_CAPACITY {
            if debug_flags::first_n(&QUEUE_FULL_LOG, 8) {
                log::warn!("interrupt queue full, dropping {:?}", kind);
            }
            return false;
        }
        let at = self
            .pending
            .iter()
            .position(|existing| kind < *existing)
            .unwrap_or(self.pending.len());
        self.pending.insert(at, kind);
        true
    }

    /// Removes and returns the highest-priority entry that may run now.
    pub fn pop_serviceable(&mut self, interrupts_disabled: bool) -> Option<InterruptKind> {
        let idx = self
            .pending
            .iter()
            .position(|k| !(interrupts_disabled && k.is_maskable()))?;
        Some(self.pending.remove(idx))
    }

    pub fn peek(&self) -> Option<InterruptKind> {
        self.pending.first().copied()
    }

    pub fn contains(&self, kind: InterruptKind) -> bool {
        self.pending.contains(&kind)
    }

    pub fn remove(&mut self, kind: InterruptKind) {
        self.pending.retain(|k| *k != kind);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterruptKind> {
        self.pending.iter()
    }
}

#[derive(Debug, Clone)]
pub struct InterruptSystem {
    queue: InterruptQueue,
    enabled: bool,
    processing: bool,
    vblank_pending: bool,
    nmi_period: u32,
    cycles_since_nmi: u32,
    serviced: u64,
}

impl Default for InterruptSystem {
    fn default() -> Self {
        Self::new(DEFAULT_NMI_PERIOD)
    }
}

impl InterruptSystem {
    /// Comes up with RESET already queued.
    pub fn new(nmi_period: u32) -> Self {
        let mut system = Self {
            queue: InterruptQueue::new(),
            enabled: true,
            processing: false,
            vblank_pending: false,
            nmi_period: nmi_period.max(1),
            cycles_since_nmi: 0,
            serviced: 0,
        };
        system.request(InterruptKind::Reset);
        system
    }

    pub fn reset(&mut self) {
        self.queue.clear();
        self.enabled = true;
        self.processing = false;
        self.vblank_pending = false;
        self.cycles_since_nmi = 0;
        self.request(InterruptKind::Reset);
    }

    pub fn request(&mut self, kind: InterruptKind) {
        if !self.enabled {
            return;
        }
        if kind == InterruptKind::Nmi {
            self.vblank_pending = true;
        }
        self.queue.enqueue(kind);
    }

    /// Advances the VBlank timer; queues an NMI once per period unless one is pending.
    pub fn tick(&mut self, cycles: u32) {
        if !self.enabled {
            return;
        }
        self.cycles_since_nmi += cycles;
        while self.cycles_since_nmi >= self.nmi_period {
            self.cycles_since_nmi -= self.nmi_period;
            if !self.vblank_pending {
                self.request(InterruptKind::Nmi);
            }
        }
    }

    /// Enters the servicing critical region. Returns false if already inside it.
    pub fn begin_service(&mut self) -> bool {
        if self.processing {
            return false;
        }
        self.processing = true;
        true
    }

    pub fn end_service(&mut self) {
        self.processing = false;
    }

    pub fn next_serviceable(&mut self, interrupts_disabled: bool) -> Option<InterruptKind> {
        let kind = self.queue.pop_serviceable(interrupts_disabled)?;
        if kind == InterruptKind::Nmi {
            self.vblank_pending = false;
        }
        self.serviced += 1;
        Some(kind)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.queue.clear();
            self.vblank_pending = false;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_pending(&self, kind: InterruptKind) -> bool {
        self.queue.contains(kind)
    }

    pub fn is_vblank_pending(&self) -> bool {
        self.vblank_pending
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn queue(&self) -> &InterruptQueue {
        &self.queue
    }

    pub fn serviced_count(&self) -> u64 {
        self.serviced
    }

    pub fn nmi_period(&self) -> u32 {
        self.nmi_period
    }
}
