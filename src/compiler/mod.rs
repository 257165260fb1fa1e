//! Program compiler adapter.
//!
//! Turns WGSL source text into [`CompiledModule`]s. A module is compiled against a
//! [`Profile`]:
//!
//! - **Library**: every compute and vertex entry point in the source becomes an
//!   export, together with the node directives attached to it. Fragment entry
//!   points never live in a library.
//! - **Fragment**: exactly one named fragment entry point, shared by every
//!   draw-capable node that rasterizes through it.
//!
//! The same source text is usually compiled twice, once per profile.
//!
//! # Example
//!
//! ```ignore
//! use mesh_nodes::compiler::{ProgramCompiler, Profile};
//!
//! let source = include_str!("../shaders/snowflake.wgsl");
//! let mut compiler = ProgramCompiler::new();
//! let library = compiler.compile(source, None, Profile::Library)?;
//! let fragment = compiler.compile(source, Some("MeshNodePixelShader"), Profile::Fragment)?;
//! ```

pub mod directive;
pub mod reflect;

use std::fmt;
use std::sync::Arc;

use naga::ShaderStage;
use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};

use crate::error::{Error, Result};
pub use directive::{FunctionDirectives, NodeDirective, OutputDirective, RecursionBound};

/// Target profile a module is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    /// Node library: all compute and vertex entry points.
    Library,
    /// A single fragment entry point.
    Fragment,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Library => f.write_str("library"),
            Profile::Fragment => f.write_str("fragment"),
        }
    }
}

/// One entry point exported by a compiled module.
#[derive(Debug, Clone)]
pub struct Export {
    pub name: String,
    pub stage: ShaderStage,
    pub workgroup_size: [u32; 3],
    /// Index of the entry point inside the naga module.
    pub entry_index: usize,
    /// Node directives attached to the function, if it declares a node.
    pub directives: Option<FunctionDirectives>,
}

struct ModuleData {
    source: Arc<str>,
    profile: Profile,
    module: naga::Module,
    info: ModuleInfo,
    exports: Vec<Export>,
}

/// An immutable compiled module.
///
/// Cloning is cheap and shares the compiled data, so a program object can keep
/// every module it was created from alive for as long as it exists.
#[derive(Clone)]
pub struct CompiledModule {
    data: Arc<ModuleData>,
}

impl CompiledModule {
    /// The profile this module was compiled for.
    pub fn profile(&self) -> Profile {
        self.data.profile
    }

    /// Entry points exported by this module.
    pub fn exports(&self) -> &[Export] {
        &self.data.exports
    }

    /// Looks up an export by name.
    pub fn export(&self, name: &str) -> Option<&Export> {
        self.data.exports.iter().find(|e| e.name == name)
    }

    /// Source text the module was compiled from.
    pub fn source(&self) -> &str {
        &self.data.source
    }

    pub(crate) fn naga(&self) -> &naga::Module {
        &self.data.module
    }

    pub(crate) fn info(&self) -> &ModuleInfo {
        &self.data.info
    }

    /// Returns `true` if both handles refer to the same compiled module.
    pub fn ptr_eq(&self, other: &CompiledModule) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledModule")
            .field("profile", &self.data.profile)
            .field(
                "exports",
                &self.data.exports.iter().map(|e| &e.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Scoped handle to the compiler service.
///
/// Holds the validator for as long as modules are being compiled and releases it
/// when dropped, on success and error paths alike.
pub struct ProgramCompiler {
    validator: Validator,
    compiled: usize,
}

impl ProgramCompiler {
    /// Creates a compiler handle with full validation enabled.
    pub fn new() -> Self {
        tracing::debug!("compiler acquired");
        Self {
            validator: Validator::new(ValidationFlags::all(), Capabilities::default()),
            compiled: 0,
        }
    }

    /// Compiles `source` for `profile`.
    ///
    /// With `entry` set to `None` a library exports every compute and vertex entry
    /// point in the source. With a name, only that entry point is exported. The
    /// fragment profile always needs an entry name.
    ///
    /// # Errors
    ///
    /// [`Error::Compile`] for parse or validation diagnostics,
    /// [`Error::MissingEntryPoint`] if the requested entry point does not exist for
    /// the profile, and [`Error::Directive`] for malformed node directives.
    pub fn compile(
        &mut self,
        source: &str,
        entry: Option<&str>,
        profile: Profile,
    ) -> Result<CompiledModule> {
        let label = entry.unwrap_or("<library>");
        let compile_error = |message: String| Error::Compile {
            entry: label.to_string(),
            message,
        };

        let module = naga::front::wgsl::parse_str(source)
            .map_err(|e| compile_error(e.emit_to_string(source)))?;
        let info = self
            .validator
            .validate(&module)
            .map_err(|e| compile_error(e.emit_to_string(source)))?;

        let exports = match profile {
            Profile::Library => library_exports(source, &module, entry)?,
            Profile::Fragment => vec![fragment_export(&module, entry)?],
        };

        self.compiled += 1;
        tracing::debug!(
            %profile,
            entry = label,
            exports = exports.len(),
            "compiled module"
        );

        Ok(CompiledModule {
            data: Arc::new(ModuleData {
                source: source.into(),
                profile,
                module,
                info,
                exports,
            }),
        })
    }
}

impl Default for ProgramCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProgramCompiler {
    fn drop(&mut self) {
        tracing::debug!(modules = self.compiled, "compiler released");
    }
}

fn export_of(index: usize, ep: &naga::EntryPoint) -> Export {
    Export {
        name: ep.name.clone(),
        stage: ep.stage,
        workgroup_size: ep.workgroup_size,
        entry_index: index,
        directives: None,
    }
}

fn library_exports(
    source: &str,
    module: &naga::Module,
    entry: Option<&str>,
) -> Result<Vec<Export>> {
    let mut directives = directive::parse(source)?;

    let mut exports: Vec<Export> = module
        .entry_points
        .iter()
        .enumerate()
        .filter(|(_, ep)| matches!(ep.stage, ShaderStage::Compute | ShaderStage::Vertex))
        .filter(|(_, ep)| entry.is_none_or(|name| ep.name == name))
        .map(|(i, ep)| export_of(i, ep))
        .collect();

    if let Some(name) = entry
        && exports.is_empty()
    {
        return Err(Error::MissingEntryPoint {
            entry: name.to_string(),
            profile: Profile::Library.to_string(),
        });
    }

    for export in &mut exports {
        export.directives = directives.remove(&export.name);
    }

    // Directives on functions that are not exported would silently vanish.
    if entry.is_none()
        && let Some((name, found)) = directives.into_iter().next()
    {
        let line = found.node.map(|n| n.line).unwrap_or_default();
        return Err(Error::Directive {
            line,
            message: format!("`{name}` is not a compute or vertex entry point"),
        });
    }

    Ok(exports)
}

fn fragment_export(module: &naga::Module, entry: Option<&str>) -> Result<Export> {
    let missing = |name: &str| Error::MissingEntryPoint {
        entry: name.to_string(),
        profile: Profile::Fragment.to_string(),
    };
    let name = entry.ok_or_else(|| missing("<none>"))?;
    module
        .entry_points
        .iter()
        .enumerate()
        .find(|(_, ep)| ep.name == name && ep.stage == ShaderStage::Fragment)
        .map(|(i, ep)| export_of(i, ep))
        .ok_or_else(|| missing(name))
}
