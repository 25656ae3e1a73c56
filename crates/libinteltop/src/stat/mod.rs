// Engine busyness statistics: group tables, topology resolution, and the
// per-device engine registry.
//
// ref: https://www.kernel.org/doc/html/latest/gpu/i915.html (i915 PMU)
// ref: https://docs.kernel.org/gpu/xe/index.html

mod engine_group;
pub use engine_group::*;

mod topology;
pub use topology::*;

mod engine;
pub use engine::*;

mod registry;
pub use registry::*;
