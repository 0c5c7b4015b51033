//! Thread-safe metering shared between the audio thread and a viewer.
//!
//! Levels are single floats stored as bits in atomics. History meshes are
//! handed over with an `empty` flag: the audio thread only writes a mesh the
//! reader has emptied, and the reader only reads a mesh the writer has filled.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// The four signals every channel meters and graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    Input,
    Output,
    Sidechain,
    Gain,
}

impl GraphKind {
    pub const COUNT: usize = 4;
    pub const ALL: [GraphKind; Self::COUNT] = [
        GraphKind::Input,
        GraphKind::Output,
        GraphKind::Sidechain,
        GraphKind::Gain,
    ];

    pub fn index(self) -> usize {
        match self {
            GraphKind::Input => 0,
            GraphKind::Output => 1,
            GraphKind::Sidechain => 2,
            GraphKind::Gain => 3,
        }
    }
}

pub struct HistoryMesh {
    values: Box<[AtomicU32]>,
    empty: AtomicBool,
}

impl HistoryMesh {
    fn new(size: usize) -> Self {
        Self {
            values: (0..size).map(|_| AtomicU32::new(0)).collect(),
            empty: AtomicBool::new(true),
        }
    }

    /// True when no snapshot is waiting for the reader.
    pub fn consumed(&self) -> bool {
        self.empty.load(Ordering::Acquire)
    }

    /// Writes `points` if the reader consumed the previous snapshot.
    pub fn publish(&self, points: impl Iterator<Item = f32>) -> bool {
        if !self.consumed() {
            return false;
        }
        for (slot, v) in self.values.iter().zip(points) {
            slot.store(v.to_bits(), Ordering::Relaxed);
        }
        self.empty.store(false, Ordering::Release);
        true
    }

    /// Copies a pending snapshot into `dst` and marks the mesh empty again.
    pub fn read(&self, dst: &mut [f32]) -> bool {
        if self.consumed() {
            return false;
        }
        for (d, slot) in dst.iter_mut().zip(self.values.iter()) {
            *d = f32::from_bits(slot.load(Ordering::Relaxed));
        }
        self.empty.store(true, Ordering::Release);
        true
    }
}

pub struct ChannelMeters {
    levels: [AtomicU32; GraphKind::COUNT],
    meshes: [HistoryMesh; GraphKind::COUNT],
}

impl ChannelMeters {
    fn new(mesh_size: usize) -> Self {
        Self {
            levels: Default::default(),
            meshes: std::array::from_fn(|_| HistoryMesh::new(mesh_size)),
        }
    }

    pub fn set_level(&self, kind: GraphKind, val: f32) {
        self.levels[kind.index()].store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self, kind: GraphKind) -> f32 {
        f32::from_bits(self.levels[kind.index()].load(Ordering::Relaxed))
    }

    pub fn mesh(&self, kind: GraphKind) -> &HistoryMesh {
        &self.meshes[kind.index()]
    }
}

pub struct Meters {
    channels: Vec<ChannelMeters>,
    sync_requested: AtomicBool,
}

impl Meters {
    pub fn new(channels: usize, mesh_size: usize) -> Self {
        Self {
            channels: (0..channels).map(|_| ChannelMeters::new(mesh_size)).collect(),
            sync_requested: AtomicBool::new(false),
        }
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelMeters> {
        self.channels.get(index)
    }

    /// Asks the audio thread for one snapshot even while history is paused.
    pub fn request_sync(&self) {
        self.sync_requested.store(true, Ordering::Release);
    }

    pub fn take_sync_request(&self) -> bool {
        self.sync_requested.swap(false, Ordering::AcqRel)
    }

    pub fn reset(&self) {
        for ch in &self.channels {
            for kind in GraphKind::ALL {
                let idle = if kind == GraphKind::Gain { 1.0 } else { 0.0 };
                ch.set_level(kind, idle);
            }
        }
    }
}
