use bitflags::bitflags;

/// Heap object formats. Stored in the low byte of the header.
///
/// Every format has exactly one `scan`/`update` specialisation in the
/// VM's tracer; leaf formats carry no heap references and are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeapFormat {
    HeapDouble = 0,
    HeapString,
    U32Array,
    BoxArray,
    PackedSyntaxTree,
    SyntaxNode,
    PropertyDict,
    CallScope,
    ModuleScope,
    GlobalScope,
    LookupState,
    NativeFunction,
    ScriptedFunction,
    FunctionObject,
    SlistNode,
    Exception,
    Continuation,
    Frame,
}

impl HeapFormat {
    pub const COUNT: usize = Self::Frame as usize + 1;

    #[inline(always)]
    pub fn from_u8(raw: u8) -> Self {
        debug_assert!((raw as usize) < Self::COUNT);
        unsafe { core::mem::transmute::<u8, HeapFormat>(raw) }
    }

    /// Leaf formats hold no heap-valued fields.
    #[inline(always)]
    pub const fn is_leaf(self) -> bool {
        matches!(
            self,
            HeapFormat::HeapDouble
                | HeapFormat::HeapString
                | HeapFormat::U32Array
                | HeapFormat::NativeFunction
        )
    }
}

/// GC generations in allocation-age order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Generation {
    Hatchery = 0,
    Nursery = 1,
    Tenured = 2,
}

impl Generation {
    #[inline(always)]
    pub fn from_u8(raw: u8) -> Self {
        debug_assert!(raw <= 2);
        unsafe { core::mem::transmute::<u8, Generation>(raw) }
    }

    /// The generation survivors are copied into.
    #[inline(always)]
    pub const fn next(self) -> Self {
        match self {
            Generation::Hatchery => Generation::Nursery,
            Generation::Nursery | Generation::Tenured => Generation::Tenured,
        }
    }
}

bitflags! {
    /// GC / bookkeeping flags packed into the header word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u64 {
        /// Major-cycle traversal mark.
        const MARKED = 1 << 18;
        /// The first payload word holds the forwarded address.
        const FORWARDED = 1 << 19;
        /// Object is in the remembered set.
        const REMEMBERED = 1 << 20;
        /// Object resides in a singleton slab.
        const SINGLETON = 1 << 21;
    }
}

const FORMAT_SHIFT: u32 = 0;
const USER_DATA_SHIFT: u32 = 8;
const GENERATION_SHIFT: u32 = 16;
const GENERATION_MASK: u64 = 0b11;
const SIZE_SHIFT: u32 = 32;

/// The 8-byte header at the start of every heap object.
///
/// ```text
/// bits  0..7   format
/// bits  8..15  user_data (format-specific; frame kind, operative flag)
/// bits 16..17  generation
/// bits 18..21  flags ([`HeaderFlags`])
/// bits 32..63  size in 8-byte words, header included
/// ```
///
/// Size is immutable after allocation.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct HeapHeader(u64);

const _: () = assert!(size_of::<HeapHeader>() == 8);

impl HeapHeader {
    pub fn new(format: HeapFormat, size_in_words: u32) -> Self {
        Self(
            ((format as u8 as u64) << FORMAT_SHIFT)
                | ((size_in_words as u64) << SIZE_SHIFT),
        )
    }

    #[inline(always)]
    pub fn format(&self) -> HeapFormat {
        HeapFormat::from_u8((self.0 >> FORMAT_SHIFT) as u8)
    }

    #[inline(always)]
    pub fn size_in_words(&self) -> u32 {
        (self.0 >> SIZE_SHIFT) as u32
    }

    #[inline(always)]
    pub fn size_in_bytes(&self) -> usize {
        self.size_in_words() as usize * 8
    }

    // ── user data ──────────────────────────────────────────────────

    #[inline(always)]
    pub fn user_data(&self) -> u8 {
        (self.0 >> USER_DATA_SHIFT) as u8
    }

    #[inline(always)]
    pub fn set_user_data(&mut self, data: u8) {
        self.0 = (self.0 & !(0xFFu64 << USER_DATA_SHIFT))
            | ((data as u64) << USER_DATA_SHIFT);
    }

    // ── generation ─────────────────────────────────────────────────

    #[inline(always)]
    pub fn generation(&self) -> Generation {
        Generation::from_u8(((self.0 >> GENERATION_SHIFT) & GENERATION_MASK) as u8)
    }

    #[inline(always)]
    pub fn set_generation(&mut self, generation: Generation) {
        self.0 = (self.0 & !(GENERATION_MASK << GENERATION_SHIFT))
            | ((generation as u8 as u64) << GENERATION_SHIFT);
    }

    // ── flags ──────────────────────────────────────────────────────

    #[inline(always)]
    pub fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_truncate(self.0)
    }

    #[inline(always)]
    pub fn set_flags(&mut self, flags: HeaderFlags) {
        self.0 = (self.0 & !HeaderFlags::all().bits()) | flags.bits();
    }

    #[inline(always)]
    pub fn has_flag(&self, flag: HeaderFlags) -> bool {
        self.flags().contains(flag)
    }

    #[inline(always)]
    pub fn add_flag(&mut self, flag: HeaderFlags) {
        self.0 |= flag.bits();
    }

    #[inline(always)]
    pub fn remove_flag(&mut self, flag: HeaderFlags) {
        self.0 &= !flag.bits();
    }

    #[inline(always)]
    pub fn is_marked(&self) -> bool {
        self.has_flag(HeaderFlags::MARKED)
    }

    #[inline(always)]
    pub fn set_marked(&mut self) {
        self.add_flag(HeaderFlags::MARKED);
    }

    #[inline(always)]
    pub fn clear_marked(&mut self) {
        self.remove_flag(HeaderFlags::MARKED);
    }

    #[inline(always)]
    pub fn is_forwarded(&self) -> bool {
        self.has_flag(HeaderFlags::FORWARDED)
    }

    #[inline(always)]
    pub fn set_forwarded(&mut self) {
        self.add_flag(HeaderFlags::FORWARDED);
    }

    #[inline(always)]
    pub fn is_remembered(&self) -> bool {
        self.has_flag(HeaderFlags::REMEMBERED)
    }

    #[inline(always)]
    pub fn set_remembered(&mut self) {
        self.add_flag(HeaderFlags::REMEMBERED);
    }

    #[inline(always)]
    pub fn clear_remembered(&mut self) {
        self.remove_flag(HeaderFlags::REMEMBERED);
    }

    #[inline(always)]
    pub fn is_singleton(&self) -> bool {
        self.has_flag(HeaderFlags::SINGLETON)
    }

    #[inline(always)]
    pub fn set_singleton(&mut self) {
        self.add_flag(HeaderFlags::SINGLETON);
    }
}

impl core::fmt::Debug for HeapHeader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HeapHeader")
            .field("format", &self.format())
            .field("generation", &self.generation())
            .field("size_in_words", &self.size_in_words())
            .field("user_data", &self.user_data())
            .finish()
    }
}

/// Round a byte size up to whole 8-byte words.
#[inline(always)]
pub const fn words_for_bytes(bytes: usize) -> u32 {
    ((bytes + 7) / 8) as u32
}
