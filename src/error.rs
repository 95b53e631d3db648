// Error handling - two severities
//
// Fatal:   setup failed, continuing makes no sense (device, surface, pipeline).
// Warning: a single resource operation was abandoned; the caller decides
//          whether to retry, skip, or escalate.
//
// Errors are logged where they are raised, so call sites only have to decide
// what to do next.

use ash::vk;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::backend::sync::FrameState;

/// How bad a failure is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => f.write_str("fatal"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// What went wrong
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("{0} failed: {1}")]
    Vulkan(&'static str, #[source] vk::Result),

    #[error("no memory type in bits {type_bits:#b} provides {desired:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        desired: vk::MemoryPropertyFlags,
    },

    #[error("slot {index} is outside capacity {capacity}")]
    SlotOutOfRange { index: usize, capacity: usize },

    #[error("texture slot {0} holds no image")]
    EmptySlot(usize),

    #[error("resource table needs more than one texture slot, got {0}")]
    CapacityTooSmall(usize),

    #[error("payload of {len} bytes does not fit allocation of {capacity} bytes")]
    PayloadTooLarge { len: u64, capacity: u64 },

    #[error("pixel data holds {actual} bytes but a {width}x{height} RGBA texture needs {expected}")]
    PixelSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("frame is {actual:?}, cannot {operation}")]
    InvalidFrameState {
        actual: FrameState,
        operation: &'static str,
    },

    #[error("GPU did not signal the frame fence within {0:?}")]
    GpuTimeout(Duration),

    #[error("{0}")]
    Setup(String),
}

/// A classified failure
#[derive(Debug, Error)]
#[error("{severity}: {kind}")]
pub struct RenderError {
    severity: Severity,
    #[source]
    kind: ErrorKind,
}

pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    /// Setup failure. Logged at error level.
    pub fn fatal(kind: ErrorKind) -> Self {
        log::error!("{}", kind);
        Self {
            severity: Severity::Fatal,
            kind,
        }
    }

    /// Per-resource failure. Logged at warn level.
    pub fn warning(kind: ErrorKind) -> Self {
        log::warn!("{}", kind);
        Self {
            severity: Severity::Warning,
            kind,
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    /// Promote a warning to fatal when the caller cannot go on without it
    pub fn escalate(self) -> Self {
        if self.is_fatal() {
            return self;
        }
        log::error!("escalating: {}", self.kind);
        Self {
            severity: Severity::Fatal,
            kind: self.kind,
        }
    }
}

/// `map_err` adapter for per-resource Vulkan calls
pub(crate) fn warn_on(what: &'static str) -> impl FnOnce(vk::Result) -> RenderError {
    move |result| RenderError::warning(ErrorKind::Vulkan(what, result))
}

/// `map_err` adapter for setup Vulkan calls
pub(crate) fn fatal_on(what: &'static str) -> impl FnOnce(vk::Result) -> RenderError {
    move |result| RenderError::fatal(ErrorKind::Vulkan(what, result))
}
