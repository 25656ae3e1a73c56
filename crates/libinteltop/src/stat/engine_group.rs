use std::fmt;

/// API-visible engine classification. Single-instance groups aggregate into
/// exactly one "-all" group plus the global [`EngineGroup::All`].
///
/// The declaration order is the enumeration order callers observe; keys sort
/// by group first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EngineGroup {
    All,
    ComputeAll,
    MediaAll,
    CopyAll,
    RenderAll,
    ComputeSingle,
    RenderSingle,
    MediaDecodeSingle,
    MediaEncodeSingle,
    CopySingle,
    MediaEnhanceSingle,
}

impl EngineGroup {
    pub const fn is_single(&self) -> bool {
        matches!(
            self,
            Self::ComputeSingle |
            Self::RenderSingle |
            Self::MediaDecodeSingle |
            Self::MediaEncodeSingle |
            Self::CopySingle |
            Self::MediaEnhanceSingle
        )
    }

    /// The "-all" group a single-instance group aggregates into.
    pub const fn aggregate(&self) -> Option<Self> {
        Some(match self {
            Self::ComputeSingle => Self::ComputeAll,
            Self::RenderSingle => Self::RenderAll,
            Self::CopySingle => Self::CopyAll,
            Self::MediaDecodeSingle |
            Self::MediaEncodeSingle |
            Self::MediaEnhanceSingle => Self::MediaAll,
            _ => return None,
        })
    }
}

impl fmt::Display for EngineGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::All => "All",
            Self::ComputeAll => "Compute (all)",
            Self::MediaAll => "Media (all)",
            Self::CopyAll => "Copy (all)",
            Self::RenderAll => "Render (all)",
            Self::ComputeSingle => "Compute",
            Self::RenderSingle => "Render",
            Self::MediaDecodeSingle => "Media Decode",
            Self::MediaEncodeSingle => "Media Encode",
            Self::CopySingle => "Copy",
            Self::MediaEnhanceSingle => "Media Enhance",
        };

        write!(f, "{s}")
    }
}

/// Unique identity of one discoverable engine entity. The derived ordering
/// (group, then instance, then subdevice) is what makes enumeration stable
/// and duplicate-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineKey {
    pub group: EngineGroup,
    pub instance: u32,
    pub subdevice: u32,
}

// Kernel engine class numbering. i915 and xe agree on the values; xe calls
// class 2 "video decode" where i915 calls it "video", the expansion below is
// the same either way.
pub mod engine_class {
    pub const RENDER: u16 = 0;
    pub const COPY: u16 = 1;
    pub const VIDEO: u16 = 2;
    pub const VIDEO_ENHANCE: u16 = 3;
    pub const COMPUTE: u16 = 4;
}

/// Kernel engine class -> engine groups, one-to-many: a video engine serves
/// both the decode and the encode group.
const CLASS_TO_GROUPS: &[(u16, &[EngineGroup])] = &[
    (engine_class::RENDER, &[EngineGroup::RenderSingle]),
    (engine_class::COPY, &[EngineGroup::CopySingle]),
    (engine_class::VIDEO, &[EngineGroup::MediaDecodeSingle, EngineGroup::MediaEncodeSingle]),
    (engine_class::VIDEO_ENHANCE, &[EngineGroup::MediaEnhanceSingle]),
    (engine_class::COMPUTE, &[EngineGroup::ComputeSingle]),
];

/// Unknown classes expand to nothing; the descriptor contributes no keys.
pub fn groups_for_class(class: u16) -> &'static [EngineGroup] {
    CLASS_TO_GROUPS
        .iter()
        .find(|(c, _)| *c == class)
        .map(|(_, groups)| *groups)
        .unwrap_or(&[])
}

/// Reverse direction of [`groups_for_class`]; aggregate groups have no
/// kernel class of their own.
pub fn class_for_group(group: EngineGroup) -> Option<u16> {
    CLASS_TO_GROUPS
        .iter()
        .find(|(_, groups)| groups.contains(&group))
        .map(|(class, _)| *class)
}
