use core::fmt;

/// Why a pointer handed back to the heap was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerFault {
    Null,
    Misaligned,
    OutOfBounds,
    /// Recorded size is below the minimum, unaligned, or runs past the epilogue.
    BadSize,
    NotAllocated,
    /// Header claims a free left neighbour whose footer says otherwise.
    PrevAllocatedMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    OutOfMemory,
    InvalidArgument,
    InvalidConfig(&'static str),
    InvalidPointer(PointerFault),
    /// An invariant audit found inconsistent block metadata.
    Corrupted { offset: usize, reason: &'static str },
}

impl fmt::Display for PointerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            PointerFault::Null => "null pointer",
            PointerFault::Misaligned => "pointer is not block aligned",
            PointerFault::OutOfBounds => "pointer lies outside the arena",
            PointerFault::BadSize => "block size is invalid",
            PointerFault::NotAllocated => "block is not allocated",
            PointerFault::PrevAllocatedMismatch => "left neighbour metadata disagrees",
        };
        f.write_str(msg)
    }
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::OutOfMemory => write!(f, "arena exhausted"),
            HeapError::InvalidArgument => write!(f, "invalid argument"),
            HeapError::InvalidConfig(msg) => write!(f, "invalid arena configuration: {msg}"),
            HeapError::InvalidPointer(fault) => write!(f, "invalid pointer: {fault}"),
            HeapError::Corrupted { offset, reason } => {
                write!(f, "heap corrupted at offset {offset:#x}: {reason}")
            }
        }
    }
}

impl core::error::Error for HeapError {}

/// The last-error condition kept by a heap, in the spirit of `errno`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    OutOfMemory,
    InvalidArgument,
}

impl ErrorCode {
    pub fn as_errno(self) -> i32 {
        match self {
            ErrorCode::OutOfMemory => libc::ENOMEM,
            ErrorCode::InvalidArgument => libc::EINVAL,
        }
    }
}

impl From<ErrorCode> for HeapError {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::OutOfMemory => HeapError::OutOfMemory,
            ErrorCode::InvalidArgument => HeapError::InvalidArgument,
        }
    }
}

impl From<PointerFault> for HeapError {
    fn from(fault: PointerFault) -> Self {
        HeapError::InvalidPointer(fault)
    }
}
