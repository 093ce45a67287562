//! The RPC argument descriptor.
//!
//! Every parameter of every remote procedure in this system carries a 32-bit
//! [`ArgSpec`] describing its direction, its arrayness, and its element type.
//! The original design transmitted these alongside a raw `void**` argument
//! vector so a generic RPC library could marshal parameters it knew nothing
//! about. Here the transport (`bincode` over HTTP, see `crate::proto`) already
//! knows the concrete Rust type of each field, so `ArgSpec` is no longer
//! needed to *drive* encoding — but every procedure still builds one per
//! parameter and validates it, preserving the invariant-checking semantics
//! the spec describes.

/// Bit position of the input flag.
const ARG_INPUT: u32 = 31;
/// Bit position of the output flag.
const ARG_OUTPUT: u32 = 30;
/// Bit position of the array flag.
const ARG_ARRAY: u32 = 25;
/// Bit offset of the element-type tag.
const ARG_TYPE_SHIFT: u32 = 16;
/// Mask covering the array-length field (bits 15..0).
const ARG_LENGTH_MASK: u32 = 0x0000_FFFF;

/// Element type tag carried in bits 24..16 of an [`ArgSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ElementType {
    Char = 0,
    Short = 1,
    Int = 2,
    Long = 3,
    Double = 4,
}

/// A packed 32-bit RPC argument descriptor.
///
/// Layout: bit 31 input, bit 30 output, bit 25 array, bits 24..16 element
/// type, bits 15..0 array length (zero when not an array).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec(u32);

impl ArgSpec {
    /// Builds a descriptor, asserting the spec's invariants: at least one of
    /// input/output must be set, and an array must carry a nonzero length.
    ///
    /// Mirrors the original's `assert(!array || (array && length > 0))`: a
    /// debug-only check, not a runtime error path, since a malformed
    /// descriptor here is a programming bug in this crate, not a value that
    /// can arrive from the network.
    pub fn new(input: bool, output: bool, array: bool, elem: ElementType, length: u16) -> Self {
        debug_assert!(input || output, "ArgSpec must carry input or output");
        debug_assert!(!array || length > 0, "array ArgSpec must have length > 0");

        let mut code: u32 = 0;
        if input {
            code |= 1 << ARG_INPUT;
        }
        if output {
            code |= 1 << ARG_OUTPUT;
        }
        if array {
            code |= (1 << ARG_ARRAY) | (length as u32 & ARG_LENGTH_MASK);
        }
        code |= (elem as u32) << ARG_TYPE_SHIFT;
        ArgSpec(code)
    }

    pub fn is_input(self) -> bool {
        self.0 & (1 << ARG_INPUT) != 0
    }

    pub fn is_output(self) -> bool {
        self.0 & (1 << ARG_OUTPUT) != 0
    }

    pub fn is_array(self) -> bool {
        self.0 & (1 << ARG_ARRAY) != 0
    }

    pub fn array_len(self) -> u16 {
        (self.0 & ARG_LENGTH_MASK) as u16
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// The zero sentinel itself, as an `ArgSpec` rather than the bare
    /// [`ARG_SENTINEL`] constant, for callers terminating a `Vec<ArgSpec>`
    /// in place. Bypasses `new`'s invariant checks since a sentinel carries
    /// neither input nor output by definition.
    pub fn sentinel() -> Self {
        ArgSpec(ARG_SENTINEL)
    }

    fn is_sentinel(self) -> bool {
        self.raw() == ARG_SENTINEL
    }
}

/// The zero sentinel terminating an argument-specification vector.
pub const ARG_SENTINEL: u32 = 0;

/// The RPC library's maximum array length per call (the chunk ceiling `M`).
///
/// Reads and writes larger than this are split into multiple RPCs by the
/// chunked bulk-transfer loop (`crate::CHUNK_CEILING` consumers in
/// `client::rpc_client`).
pub const MAX_ARRAY_LEN: usize = 4096;

/// Re-walks a per-call argument-specification vector and re-checks the
/// invariants `ArgSpec::new` already enforced at construction, stopping at
/// the terminating sentinel the way a generic marshaller reading this
/// vector off the wire would. Debug-only: a violation here is a bug in
/// this crate's own request-building code, not a value that can arrive
/// over the network.
///
/// Called once per outgoing RPC (`client::rpc_client::RpcClient`) against
/// the vector each request's `arg_spec()` builds.
pub fn debug_validate(specs: &[ArgSpec]) {
    if !cfg!(debug_assertions) {
        return;
    }
    for spec in specs {
        if spec.is_sentinel() {
            return;
        }
        debug_assert!(spec.is_input() || spec.is_output(), "arg spec carries neither input nor output");
        debug_assert!(!spec.is_array() || spec.array_len() > 0, "array arg spec has zero length");
    }
    debug_assert!(false, "arg spec vector is missing its terminating sentinel");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_arg_is_input_array_char() {
        let spec = ArgSpec::new(true, false, true, ElementType::Char, 12);
        assert!(spec.is_input());
        assert!(!spec.is_output());
        assert!(spec.is_array());
        assert_eq!(spec.array_len(), 12);
    }

    #[test]
    fn status_arg_is_output_scalar_int() {
        let spec = ArgSpec::new(false, true, false, ElementType::Int, 0);
        assert!(!spec.is_input());
        assert!(spec.is_output());
        assert!(!spec.is_array());
        assert_eq!(spec.array_len(), 0);
    }

    #[test]
    fn open_record_is_in_out_array() {
        let spec = ArgSpec::new(true, true, true, ElementType::Char, 16);
        assert!(spec.is_input());
        assert!(spec.is_output());
        assert!(spec.is_array());
        assert_eq!(spec.array_len(), 16);
    }
}
