//! Assignment of field offsets and construction of oop maps.
//!
//! Static fields are packed into the static area in the order oops, longs and doubles,
//! ints and floats, shorts and chars, then bytes and booleans. Nonstatic fields follow
//! the fields inherited from the super class in the order chosen by the
//! [`AllocationStyle`]. Fields annotated `@Contended` are placed after all other fields,
//! separated by padding.

use std::collections::BTreeSet;

use super::{
    class::JAVA_LANG_CLASS,
    field::{FieldAllocationCount, FieldAllocationType, FieldInfo},
};
use crate::options::LoadOptions;

/// The order in which nonstatic fields are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum AllocationStyle {
    /// References, then longs and doubles, ints, shorts, and bytes.
    OopsFirst,
    /// Longs and doubles, ints, shorts, bytes, then references.
    #[default]
    OopsLast,
    /// [`AllocationStyle::OopsFirst`] when the super class ends with a reference so the
    /// references of both classes form one block, [`AllocationStyle::OopsLast`]
    /// otherwise.
    SuperInheriting,
}

/// Object layout parameters of the target heap. All sizes are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutConfig {
    /// The size of a reference stored in the heap.
    pub heap_oop_size: u32,
    /// The size of a heap word.
    pub word_size: u32,
    /// The offset of the first instance field, i.e. the size of the object header.
    pub header_size: u32,
    /// The offset of the first static field within the static area. Must be a multiple
    /// of [`LayoutConfig::word_size`].
    pub static_fields_start: u32,
    /// The alignment of whole objects.
    pub object_alignment: u32,
    /// Instances of this many words or more cannot be allocated on the fast path.
    pub fast_allocate_size_limit: u32,
}

impl LayoutConfig {
    /// A 64-bit heap with compressed references and class pointers.
    #[must_use]
    pub const fn compressed() -> Self {
        Self {
            heap_oop_size: 4,
            word_size: 8,
            header_size: 12,
            static_fields_start: 0,
            object_alignment: 8,
            fast_allocate_size_limit: 128 * 1024,
        }
    }

    /// A 64-bit heap with full-width references.
    #[must_use]
    pub const fn uncompressed() -> Self {
        Self {
            heap_oop_size: 8,
            word_size: 8,
            header_size: 16,
            static_fields_start: 0,
            object_alignment: 8,
            fast_allocate_size_limit: 128 * 1024,
        }
    }

    fn align_object_size(&self, words: u32) -> u32 {
        words.next_multiple_of(self.object_alignment.div_ceil(self.word_size).max(1))
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self::compressed()
    }
}

/// A run of consecutive references in an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OopMapBlock {
    /// The offset of the first reference.
    pub offset: u32,
    /// The number of references in the run.
    pub count: u32,
}

impl OopMapBlock {
    /// Returns the offset just past the last reference of the block.
    #[must_use]
    pub const fn end_offset(&self, heap_oop_size: u32) -> u32 {
        self.offset + self.count * heap_oop_size
    }
}

/// The result of laying out a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    /// The size of an instance in heap words, aligned to the object alignment.
    pub instance_size: u32,
    /// The size of the static area in heap words.
    pub static_field_size: u32,
    /// The space taken by nonstatic fields of this class and its super classes, in
    /// units of the heap reference size.
    pub nonstatic_field_size: u32,
    /// The instance size in bytes, with the lowest bit set if instances cannot be
    /// allocated on the fast path.
    pub layout_helper: u32,
    /// The oop map blocks of an instance, including the inherited ones.
    pub oop_maps: Vec<OopMapBlock>,
    /// Whether this class or a super class declares a nonstatic field.
    pub has_nonstatic_fields: bool,
    /// The number of static reference fields.
    pub static_oop_field_count: u32,
}

impl FieldLayout {
    /// Returns the size of an instance in bytes.
    #[must_use]
    pub const fn instance_size_in_bytes(&self) -> u32 {
        self.layout_helper & !1
    }

    /// Returns `true` if instances must be allocated through the slow path.
    #[must_use]
    pub const fn needs_slow_path_allocation(&self) -> bool {
        self.layout_helper & 1 != 0
    }
}

/// The properties of a class the layout depends on besides its fields.
#[derive(Debug, Clone, Copy)]
pub struct LayoutInput<'a> {
    /// The binary name of the class.
    pub class_name: &'a str,
    /// The layout of the super class, [`None`] for `java/lang/Object` and interfaces
    /// without fields to inherit.
    pub super_layout: Option<&'a FieldLayout>,
    /// Whether the class itself is annotated `@Contended`.
    pub is_contended: bool,
    /// Whether the class is abstract or an interface.
    pub is_abstract: bool,
    /// Whether the class is an interface.
    pub is_interface: bool,
    /// Whether instances need finalization.
    pub has_finalizer: bool,
    /// Whether the class is defined by the boot loader.
    pub is_boot_loader: bool,
}

/// Next free slot and remaining capacity of one category inside the alignment gap.
#[derive(Debug, Default, Clone, Copy)]
struct GapSpace {
    offset: u32,
    count: u32,
}

impl GapSpace {
    fn take(&mut self, size: u32) -> Option<u32> {
        if self.count == 0 {
            return None;
        }
        let offset = self.offset;
        self.offset += size;
        self.count -= 1;
        Some(offset)
    }
}

/// Returns the current offset and advances it past a field of `size` bytes.
fn bump(next: &mut u32, size: u32) -> u32 {
    let offset = *next;
    *next += size;
    offset
}

/// Appends a reference at `offset` to the oop maps, extending the last block when the
/// reference directly follows it.
fn record_oop(maps: &mut Vec<OopMapBlock>, offset: u32, heap_oop_size: u32) {
    match maps.last_mut() {
        Some(last) if last.end_offset(heap_oop_size) == offset => last.count += 1,
        _ => maps.push(OopMapBlock { offset, count: 1 }),
    }
}

/// Combines the inherited oop maps with the ones of this class. When the first local
/// block starts where the last inherited one ends, the two are merged.
fn merge_oop_maps(
    super_maps: &[OopMapBlock],
    local_maps: Vec<OopMapBlock>,
    heap_oop_size: u32,
) -> Vec<OopMapBlock> {
    let mut maps = super_maps.to_vec();
    let mut local = local_maps.into_iter().peekable();
    if let (Some(last), Some(first)) = (maps.last_mut(), local.peek().copied())
        && last.end_offset(heap_oop_size) == first.offset
    {
        log::trace!(
            "Merging oop map block at {} into the inherited block at {}",
            first.offset,
            last.offset
        );
        last.count += first.count;
        local.next();
    }
    maps.extend(local);
    maps
}

/// Assigns an offset to every field and computes the sizes and oop maps of the class.
///
/// # Panics
/// Panics if the computed layout is internally inconsistent. This cannot happen for
/// fields that passed parsing and indicates a bug.
#[must_use]
#[allow(
    clippy::too_many_lines,
    reason = "The layout is one sequence of dependent offset computations."
)]
pub fn layout_fields(
    fields: &mut [FieldInfo],
    class: &LayoutInput<'_>,
    options: &LoadOptions,
) -> FieldLayout {
    use FieldAllocationType::{
        NonstaticByte, NonstaticDouble, NonstaticOop, NonstaticShort, NonstaticWord,
        StaticByte, StaticDouble, StaticOop, StaticShort, StaticWord,
    };

    let config = &options.layout;
    let oop_size = config.heap_oop_size;
    let padding = options.contended_padding_width;

    let counts: FieldAllocationCount = fields.iter().collect();
    let contended: FieldAllocationCount = fields.iter().filter(|f| f.is_contended()).collect();
    let nonstatic_contended_count = contended.nonstatic_count();

    // Statics are packed from the start of the static area.
    let mut next_static_oop = config.static_fields_start;
    let mut next_static_double = next_static_oop + counts.count(StaticOop) * oop_size;
    if counts.count(StaticDouble) > 0 {
        next_static_double = next_static_double.next_multiple_of(8);
    }
    let mut next_static_word = next_static_double + counts.count(StaticDouble) * 8;
    let mut next_static_short = next_static_word + counts.count(StaticWord) * 4;
    let mut next_static_byte = next_static_short + counts.count(StaticShort) * 2;

    let super_field_size = class.super_layout.map_or(0, |it| it.nonstatic_field_size);
    let nonstatic_fields_start = config.header_size + super_field_size * oop_size;
    let mut next_nonstatic_field = nonstatic_fields_start;
    if class.is_contended {
        next_nonstatic_field += padding;
    }

    // Contended fields are placed separately and never fill gaps.
    let mut double_count = counts.count(NonstaticDouble) - contended.count(NonstaticDouble);
    let mut word_count = counts.count(NonstaticWord) - contended.count(NonstaticWord);
    let mut short_count = counts.count(NonstaticShort) - contended.count(NonstaticShort);
    let mut byte_count = counts.count(NonstaticByte) - contended.count(NonstaticByte);
    let mut oop_count = counts.count(NonstaticOop) - contended.count(NonstaticOop);
    let nonstatic_fields_count = counts.nonstatic_count();
    let has_nonstatic_fields = class.super_layout.is_some_and(|it| it.has_nonstatic_fields)
        || nonstatic_fields_count != 0;

    let mut compact_fields = options.compact_fields;
    let mut style = options.allocation_style;
    if class.is_boot_loader && options.has_fixed_field_offsets(class.class_name) {
        style = AllocationStyle::OopsFirst;
        compact_fields = false;
    }
    if style == AllocationStyle::SuperInheriting {
        let super_oops_adjoin = super_field_size > 0
            && class
                .super_layout
                .and_then(|it| it.oop_maps.last())
                .is_some_and(|last| last.end_offset(oop_size) == next_nonstatic_field);
        style = if super_oops_adjoin {
            AllocationStyle::OopsFirst
        } else {
            AllocationStyle::OopsLast
        };
    }
    let oops_first = style == AllocationStyle::OopsFirst;
    log::trace!(
        "Laying out {} with {:?}, nonstatic fields start at {}",
        class.class_name,
        style,
        next_nonstatic_field
    );

    let mut next_nonstatic_oop = 0;
    let mut next_nonstatic_double = next_nonstatic_field;
    if oops_first {
        next_nonstatic_oop = next_nonstatic_field;
        next_nonstatic_double = next_nonstatic_oop + oop_count * oop_size;
    }

    // Smaller fields fill the gap in front of the first 8-byte aligned field.
    let mut word_space = GapSpace::default();
    let mut short_space = GapSpace::default();
    let mut byte_space = GapSpace::default();
    let mut oop_space = GapSpace::default();
    if double_count > 0 {
        let mut offset = next_nonstatic_double;
        next_nonstatic_double = next_nonstatic_double.next_multiple_of(8);
        if compact_fields && offset != next_nonstatic_double {
            let mut length = next_nonstatic_double - offset;
            word_space.offset = offset;
            if word_count > 0 && length >= 4 {
                word_count -= 1;
                word_space.count = 1;
                length -= 4;
                offset += 4;
            }
            short_space.offset = offset;
            while length >= 2 && short_count > 0 {
                short_count -= 1;
                short_space.count += 1;
                length -= 2;
                offset += 2;
            }
            byte_space.offset = offset;
            while length > 0 && byte_count > 0 {
                byte_count -= 1;
                byte_space.count += 1;
                length -= 1;
                offset += 1;
            }
            oop_space.offset = offset;
            if length >= oop_size && oop_count > 0 && !oops_first {
                oop_count -= 1;
                oop_space.count = 1;
            }
            log::trace!(
                "Filled alignment gap with {} word(s), {} short(s), {} byte(s), {} oop(s)",
                word_space.count,
                short_space.count,
                byte_space.count,
                oop_space.count
            );
        }
    }

    let mut next_nonstatic_word = next_nonstatic_double + double_count * 8;
    let mut next_nonstatic_short = next_nonstatic_word + word_count * 4;
    let mut next_nonstatic_byte = next_nonstatic_short + short_count * 2;
    let mut next_nonstatic_padded = next_nonstatic_byte + byte_count;
    if !oops_first {
        next_nonstatic_oop = next_nonstatic_padded;
        if oop_count > 0 {
            next_nonstatic_oop = next_nonstatic_oop.next_multiple_of(oop_size);
        }
        next_nonstatic_padded = next_nonstatic_oop + oop_count * oop_size;
    }

    let mut offsets: Vec<Option<u32>> = vec![None; fields.len()];
    let mut local_oop_maps = Vec::new();

    for (field, slot) in fields.iter().zip(offsets.iter_mut()) {
        if field.is_contended() && !field.is_static() {
            continue;
        }
        let offset = match field.allocation_type {
            StaticOop => bump(&mut next_static_oop, oop_size),
            StaticByte => bump(&mut next_static_byte, 1),
            StaticShort => bump(&mut next_static_short, 2),
            StaticWord => bump(&mut next_static_word, 4),
            StaticDouble => bump(&mut next_static_double, 8),
            NonstaticOop => {
                let offset = oop_space
                    .take(oop_size)
                    .unwrap_or_else(|| bump(&mut next_nonstatic_oop, oop_size));
                record_oop(&mut local_oop_maps, offset, oop_size);
                offset
            }
            NonstaticByte => byte_space
                .take(1)
                .unwrap_or_else(|| bump(&mut next_nonstatic_byte, 1)),
            NonstaticShort => short_space
                .take(2)
                .unwrap_or_else(|| bump(&mut next_nonstatic_short, 2)),
            NonstaticWord => word_space
                .take(4)
                .unwrap_or_else(|| bump(&mut next_nonstatic_word, 4)),
            NonstaticDouble => bump(&mut next_nonstatic_double, 8),
        };
        #[cfg(feature = "trace-layout")]
        log::trace!("  {} {} @ {offset}", field.name, field.signature);
        *slot = Some(offset);
    }

    if nonstatic_contended_count > 0 {
        next_nonstatic_padded += padding;
        let groups: BTreeSet<u16> = fields
            .iter()
            .filter(|f| !f.is_static())
            .filter_map(|f| f.contended_group)
            .collect();
        for group in groups {
            log::trace!("Placing contended group {group} at {next_nonstatic_padded}");
            for (field, slot) in fields.iter().zip(offsets.iter_mut()) {
                if slot.is_some() || field.is_static() || field.contended_group != Some(group) {
                    continue;
                }
                let size = field.allocation_type.size_in_bytes(oop_size);
                next_nonstatic_padded = next_nonstatic_padded.next_multiple_of(size);
                let offset = bump(&mut next_nonstatic_padded, size);
                if field.is_oop() {
                    // Every contended reference starts its own block.
                    local_oop_maps.push(OopMapBlock { offset, count: 1 });
                }
                // Fields of the default group are padded from each other.
                if group == 0 {
                    next_nonstatic_padded += padding;
                }
                #[cfg(feature = "trace-layout")]
                log::trace!("  {} {} @ {offset} (contended)", field.name, field.signature);
                *slot = Some(offset);
            }
            if group != 0 {
                next_nonstatic_padded += padding;
            }
        }
    }

    if class.is_contended {
        next_nonstatic_padded += padding;
    }

    let word_size = config.word_size;
    let nonstatic_fields_end = next_nonstatic_padded.next_multiple_of(oop_size);
    let instance_end = next_nonstatic_padded.next_multiple_of(word_size);
    let static_fields_end = next_static_byte.next_multiple_of(word_size);
    let static_field_size = (static_fields_end - config.static_fields_start) / word_size;
    let nonstatic_field_size =
        super_field_size + (nonstatic_fields_end - nonstatic_fields_start) / oop_size;
    let instance_size = config.align_object_size(instance_end / word_size);

    assert_eq!(
        instance_size,
        config.align_object_size(
            (config.header_size + nonstatic_field_size * oop_size).next_multiple_of(word_size)
                / word_size
        ),
        "inconsistent instance size for {}",
        class.class_name
    );
    assert!(
        next_nonstatic_padded == nonstatic_fields_start
            || class.is_contended
            || nonstatic_fields_count > 0,
        "nonstatic area of {} grew without fields",
        class.class_name
    );

    for (field, offset) in fields.iter_mut().zip(offsets) {
        let Some(offset) = offset else {
            panic!("field {} of {} was not laid out", field.name, class.class_name);
        };
        field.offset = offset;
    }

    let super_maps = class.super_layout.map_or(&[][..], |it| &it.oop_maps[..]);
    let oop_maps = merge_oop_maps(super_maps, local_oop_maps, oop_size);

    let slow_path = class.has_finalizer
        || class.is_abstract
        || class.is_interface
        || (class.is_boot_loader && class.class_name == JAVA_LANG_CLASS)
        || instance_size >= config.fast_allocate_size_limit;
    let layout_helper = (instance_size * word_size) | u32::from(slow_path);

    log::trace!(
        "Layout of {}: instance size {} words, static size {} words, {} oop map block(s)",
        class.class_name,
        instance_size,
        static_field_size,
        oop_maps.len()
    );

    FieldLayout {
        instance_size,
        static_field_size,
        nonstatic_field_size,
        layout_helper,
        oop_maps,
        has_nonstatic_fields,
        static_oop_field_count: counts.count(StaticOop),
    }
}
