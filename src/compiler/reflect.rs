//! Reflection over validated naga modules.
//!
//! The runtime never guesses at memory layout: queue headers, record offsets and
//! strides all come from the struct layouts naga computed while validating.

use naga::{AddressSpace, ArraySize, Expression, Literal, Module, Scalar, StorageAccess, TypeInner};
use naga::valid::ModuleInfo;

use crate::error::{Error, Result};

/// Bind group holding the global root signature.
pub const ROOT_GROUP: u32 = 0;
/// Bind group holding a node's queues and launch constants.
pub const NODE_GROUP: u32 = 1;

/// Memory layout of a record queue global.
///
/// A queue global is a storage struct whose first member is a `u32` (or
/// `atomic<u32>`) record count and whose last member is a runtime-sized array of
/// records:
///
/// ```wgsl
/// struct LineQueue {
///     count: atomic<u32>,
///     @align(16) records: array<LineRecord>,
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueLayout {
    /// Name of the global variable.
    pub global: String,
    /// Binding slot inside the node group.
    pub binding: u32,
    /// Byte offset of the record count.
    pub count_offset: u32,
    /// Byte offset of the first record.
    pub records_offset: u32,
    /// Distance between consecutive records.
    pub record_stride: u32,
    /// Name of the record struct, when it has one.
    pub record_type: Option<String>,
    /// Whether the global is declared `read_write`.
    pub writable: bool,
}

/// A uniform global bound in the node group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    pub global: String,
    pub binding: u32,
    pub size: u32,
}

/// A resource global statically used by an entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedGlobal {
    pub name: String,
    pub group: u32,
    pub binding: u32,
}

fn reflection_error(global: &str, message: impl Into<String>) -> Error {
    Error::Reflection {
        global: global.to_string(),
        message: message.into(),
    }
}

fn find_global<'m>(module: &'m Module, name: &str) -> Result<&'m naga::GlobalVariable> {
    module
        .global_variables
        .iter()
        .map(|(_, var)| var)
        .find(|var| var.name.as_deref() == Some(name))
        .ok_or_else(|| reflection_error(name, "no global with this name"))
}

fn node_binding(name: &str, var: &naga::GlobalVariable) -> Result<u32> {
    match &var.binding {
        Some(binding) if binding.group == NODE_GROUP => Ok(binding.binding),
        Some(binding) => Err(reflection_error(
            name,
            format!("bound in group {}, node resources use group {NODE_GROUP}", binding.group),
        )),
        None => Err(reflection_error(name, "missing @group/@binding")),
    }
}

fn is_u32_count(inner: &TypeInner) -> bool {
    matches!(inner, TypeInner::Scalar(scalar) | TypeInner::Atomic(scalar) if *scalar == Scalar::U32)
}

/// Reflects the layout of the queue global `name`.
pub fn queue_layout(module: &Module, name: &str) -> Result<QueueLayout> {
    let var = find_global(module, name)?;
    let writable = match var.space {
        AddressSpace::Storage { access } => access.contains(StorageAccess::STORE),
        _ => return Err(reflection_error(name, "queues must live in the storage address space")),
    };
    let binding = node_binding(name, var)?;

    let TypeInner::Struct { members, .. } = &module.types[var.ty].inner else {
        return Err(reflection_error(name, "queues must be structs"));
    };
    let (Some(header), Some(tail)) = (members.first(), members.last()) else {
        return Err(reflection_error(name, "queue struct is empty"));
    };
    if members.len() < 2 || !is_u32_count(&module.types[header.ty].inner) {
        return Err(reflection_error(name, "first member must be a u32 record count"));
    }
    let &TypeInner::Array {
        base,
        size: ArraySize::Dynamic,
        stride,
    } = &module.types[tail.ty].inner
    else {
        return Err(reflection_error(name, "last member must be a runtime-sized record array"));
    };

    Ok(QueueLayout {
        global: name.to_string(),
        binding,
        count_offset: header.offset,
        records_offset: tail.offset,
        record_stride: stride,
        record_type: module.types[base].name.clone(),
        writable,
    })
}

/// Reflects the uniform global `name`, requiring it to fit in `max_size` bytes.
pub fn uniform_layout(module: &Module, name: &str, max_size: u32) -> Result<UniformLayout> {
    let var = find_global(module, name)?;
    if var.space != AddressSpace::Uniform {
        return Err(reflection_error(name, "launch constants must be a uniform"));
    }
    let binding = node_binding(name, var)?;
    let size = module.types[var.ty].inner.size(module.to_ctx());
    if size > max_size {
        return Err(reflection_error(
            name,
            format!("{size} bytes does not fit in the {max_size} byte launch constants"),
        ));
    }
    Ok(UniformLayout {
        global: name.to_string(),
        binding,
        size,
    })
}

/// Lists the bound globals statically used by entry point `index`.
pub fn used_globals(module: &Module, info: &ModuleInfo, index: usize) -> Vec<UsedGlobal> {
    let function = info.get_entry_point(index);
    module
        .global_variables
        .iter()
        .filter(|(handle, _)| !function[*handle].is_empty())
        .filter_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            Some(UsedGlobal {
                name: var.name.clone().unwrap_or_default(),
                group: binding.group,
                binding: binding.binding,
            })
        })
        .collect()
}

/// Looks up an integer `const` declared at module scope.
pub fn constant_u32(module: &Module, name: &str) -> Option<u32> {
    let (_, constant) = module
        .constants
        .iter()
        .find(|(_, c)| c.name.as_deref() == Some(name))?;
    match module.global_expressions[constant.init] {
        Expression::Literal(Literal::U32(value)) => Some(value),
        Expression::Literal(Literal::I32(value)) => u32::try_from(value).ok(),
        Expression::Literal(Literal::AbstractInt(value)) => u32::try_from(value).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(source: &str) -> (Module, ModuleInfo) {
        let module = naga::front::wgsl::parse_str(source).unwrap();
        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::default(),
        )
        .validate(&module)
        .unwrap();
        (module, info)
    }

    const SOURCE: &str = r#"
const DEPTH: u32 = 3u;

struct Record { a: vec2f, b: vec2f }
struct Queue { count: atomic<u32>, @align(16) records: array<Record> }
struct ReadQueue { count: u32, @align(16) records: array<Record> }
struct Launch { remaining: u32, level: u32, maximum: u32, pad: u32 }

@group(1) @binding(0) var<storage, read_write> output: Queue;
@group(1) @binding(1) var<storage, read> input: ReadQueue;
@group(1) @binding(2) var<uniform> launch: Launch;
@group(0) @binding(0) var<storage, read_write> misplaced: Queue;

@compute @workgroup_size(1)
fn main() {
    let slot = atomicAdd(&output.count, 1u);
    output.records[slot] = input.records[launch.level];
}
"#;

    #[test]
    fn queue_offsets_come_from_struct_layout() {
        let (module, _) = module(SOURCE);
        let layout = queue_layout(&module, "output").unwrap();
        assert_eq!(layout.binding, 0);
        assert_eq!(layout.count_offset, 0);
        assert_eq!(layout.records_offset, 16);
        assert_eq!(layout.record_stride, 16);
        assert_eq!(layout.record_type.as_deref(), Some("Record"));
        assert!(layout.writable);

        let input = queue_layout(&module, "input").unwrap();
        assert!(!input.writable);
    }

    #[test]
    fn queues_must_live_in_node_group() {
        let (module, _) = module(SOURCE);
        assert!(matches!(
            queue_layout(&module, "misplaced"),
            Err(Error::Reflection { .. })
        ));
        assert!(queue_layout(&module, "launch").is_err());
    }

    #[test]
    fn uniform_size_is_checked() {
        let (module, _) = module(SOURCE);
        assert_eq!(uniform_layout(&module, "launch", 16).unwrap().size, 16);
        assert!(uniform_layout(&module, "launch", 8).is_err());
    }

    #[test]
    fn used_globals_follow_static_use() {
        let (module, info) = module(SOURCE);
        let mut names: Vec<_> = used_globals(&module, &info, 0)
            .into_iter()
            .map(|g| g.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["input", "launch", "output"]);
    }

    #[test]
    fn typed_constants_resolve() {
        let (module, _) = module(SOURCE);
        assert_eq!(constant_u32(&module, "DEPTH"), Some(3));
        assert_eq!(constant_u32(&module, "MISSING"), None);
    }
}
