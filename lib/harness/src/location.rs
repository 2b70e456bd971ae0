//! Locations a toolchain reads from and writes to, and the registry
//! that maps them onto the virtual tree.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crucible_vfs::FileSystem;

use crate::error::{HarnessError, Result};

/// The role a location plays for the toolchain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocationRole {
    /// Hand-written sources fed into the compiler.
    SourceInput,
    /// Sources emitted during compilation, for instance by processors.
    SourceOutput,
    /// Compiled class artifacts.
    ClassOutput,
    /// Generated native headers.
    NativeHeaderOutput,
    /// Per-module source hierarchies.
    ModuleSourceInput,
    /// Pre-compiled dependencies, resolved through the delegate.
    ClassPath,
}

impl LocationRole {
    /// The roles whose storage the harness owns.
    pub(crate) const VIRTUAL: [LocationRole; 5] = [
        Self::SourceInput,
        Self::SourceOutput,
        Self::ClassOutput,
        Self::NativeHeaderOutput,
        Self::ModuleSourceInput,
    ];

    /// Whether artifacts are written into this role.
    pub fn is_output(self) -> bool {
        matches!(
            self,
            Self::SourceOutput | Self::ClassOutput | Self::NativeHeaderOutput
        )
    }

    /// Whether the role may be scoped down to a named module.
    pub fn is_module_oriented(self) -> bool {
        matches!(
            self,
            Self::ModuleSourceInput
                | Self::SourceOutput
                | Self::ClassOutput
                | Self::NativeHeaderOutput
        )
    }

    /// Whether the harness owns the backing storage for this role.
    pub fn is_virtual(self) -> bool {
        !matches!(self, Self::ClassPath)
    }

    /// The directory the role is rooted at inside the virtual tree.
    /// [`LocationRole::ClassPath`] has no virtual root.
    pub fn root(self) -> &'static Path {
        Path::new(match self {
            Self::SourceInput => "/sources",
            Self::SourceOutput => "/generated",
            Self::ClassOutput => "/classes",
            Self::NativeHeaderOutput => "/headers",
            Self::ModuleSourceInput => "/module-sources",
            Self::ClassPath => "",
        })
    }
}

impl fmt::Display for LocationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SourceInput => "SOURCE_INPUT",
            Self::SourceOutput => "SOURCE_OUTPUT",
            Self::ClassOutput => "CLASS_OUTPUT",
            Self::NativeHeaderOutput => "NATIVE_HEADER_OUTPUT",
            Self::ModuleSourceInput => "MODULE_SOURCE_INPUT",
            Self::ClassPath => "CLASS_PATH",
        })
    }
}

/// A resolvable location: either the root of a role, or the subtree of
/// one named module beneath a module-oriented role.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    Root(LocationRole),
    Module(LocationRole, String),
}

impl Location {
    pub fn role(&self) -> LocationRole {
        match self {
            Self::Root(role) => *role,
            Self::Module(role, _) => *role,
        }
    }

    /// The module this location is scoped to, if any.
    pub fn module_name(&self) -> Option<&str> {
        match self {
            Self::Root(_) => None,
            Self::Module(_, name) => Some(name),
        }
    }

    pub fn is_output(&self) -> bool {
        self.role().is_output()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(role) => write!(f, "{role}"),
            Self::Module(role, name) => write!(f, "{role}[{name}]"),
        }
    }
}

/// Tracks the locations the harness owns and maps them onto paths in
/// the virtual tree.
///
/// Role roots are fixed at construction; module sub-locations are
/// recorded lazily, the first time they are requested.
#[derive(Debug, Default)]
pub struct LocationRegistry {
    modules: RwLock<HashMap<LocationRole, BTreeSet<String>>>,
}

impl LocationRegistry {
    /// The root location of `role`.
    pub fn root_for(&self, role: LocationRole) -> Location {
        Location::Root(role)
    }

    /// The location of module `name` beneath `role`, recording the
    /// module on first use. Asking twice for the same pair returns
    /// structurally equal locations.
    pub fn module_location_for(&self, role: LocationRole, name: &str) -> Result<Location> {
        if !role.is_module_oriented() {
            return Err(HarnessError::UnsupportedLocation(format!(
                "{role} cannot be scoped to module `{name}`"
            )));
        }

        // Recorded module names stay usable even if a writer panicked.
        let mut modules = self
            .modules
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        modules.entry(role).or_default().insert(name.to_string());

        Ok(Location::Module(role, name.to_string()))
    }

    /// Every module location recorded so far beneath `role`, in module
    /// name order.
    pub fn module_locations(&self, role: LocationRole) -> Vec<Location> {
        let modules = self
            .modules
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        modules
            .get(&role)
            .map(|names| {
                names
                    .iter()
                    .map(|name| Location::Module(role, name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `location` resolves against the harness tree.
    pub fn is_known(&self, location: &Location) -> bool {
        match location {
            Location::Root(role) => role.is_virtual(),
            Location::Module(role, name) => self
                .modules
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .get(role)
                .is_some_and(|names| names.contains(name)),
        }
    }

    /// The path backing `location` inside the virtual tree. A module
    /// location always resolves to the module's directory beneath the
    /// role root.
    pub fn path_of(&self, location: &Location) -> Result<PathBuf> {
        match location {
            Location::Root(role) if role.is_virtual() => Ok(role.root().to_path_buf()),
            Location::Module(role, name) if role.is_module_oriented() => {
                Ok(role.root().join(name))
            }
            location => Err(HarnessError::UnsupportedLocation(location.to_string())),
        }
    }

    /// Materialize the owned role roots in `fs`.
    pub fn ensure_roots(&self, fs: &FileSystem) -> Result<()> {
        for role in LocationRole::VIRTUAL {
            fs.create_dir(role.root())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_predicates() {
        assert!(LocationRole::ClassOutput.is_output());
        assert!(!LocationRole::SourceInput.is_output());
        assert!(!LocationRole::ClassPath.is_output());

        assert!(LocationRole::ModuleSourceInput.is_module_oriented());
        assert!(LocationRole::ClassOutput.is_module_oriented());
        assert!(
            !LocationRole::SourceInput.is_module_oriented(),
            "plain sources are never module scoped",
        );

        assert!(LocationRole::SourceInput.is_virtual());
        assert!(!LocationRole::ClassPath.is_virtual());
    }

    #[test]
    fn module_locations_are_deterministic() {
        let registry = LocationRegistry::default();

        let first = registry
            .module_location_for(LocationRole::ClassOutput, "mod.a")
            .expect("a module location beneath an output role");
        let second = registry
            .module_location_for(LocationRole::ClassOutput, "mod.a")
            .expect("the same module location a second time");

        assert_eq!(first, second, "the same pair resolves structurally equal");
        assert!(registry.is_known(&first));
    }

    #[test]
    fn module_locations_refused_outside_module_oriented_roles() {
        let registry = LocationRegistry::default();

        assert!(
            matches!(
                registry.module_location_for(LocationRole::SourceInput, "mod.a"),
                Err(HarnessError::UnsupportedLocation(_)),
            ),
            "plain source roots cannot be module scoped",
        );
        assert!(matches!(
            registry.module_location_for(LocationRole::ClassPath, "mod.a"),
            Err(HarnessError::UnsupportedLocation(_)),
        ));
    }

    #[test]
    fn module_paths_sit_beneath_the_role_root() {
        let registry = LocationRegistry::default();
        let location = registry
            .module_location_for(LocationRole::ModuleSourceInput, "mod.a")
            .expect("a module source location");

        let root = registry
            .path_of(&registry.root_for(LocationRole::ModuleSourceInput))
            .expect("the role root path");
        let module = registry.path_of(&location).expect("the module path");

        assert_eq!(module, root.join("mod.a"));
    }

    #[test]
    fn classpath_has_no_virtual_path() {
        let registry = LocationRegistry::default();

        assert!(matches!(
            registry.path_of(&Location::Root(LocationRole::ClassPath)),
            Err(HarnessError::UnsupportedLocation(_)),
        ));
    }

    #[test]
    fn module_enumeration_is_sorted() {
        let registry = LocationRegistry::default();

        for name in ["mod.c", "mod.a", "mod.b", "mod.a"] {
            registry
                .module_location_for(LocationRole::ModuleSourceInput, name)
                .expect("a module location");
        }

        let names: Vec<_> = registry
            .module_locations(LocationRole::ModuleSourceInput)
            .into_iter()
            .filter_map(|location| location.module_name().map(str::to_string))
            .collect();

        assert_eq!(
            names,
            vec!["mod.a", "mod.b", "mod.c"],
            "modules enumerate deduplicated and in name order",
        );
    }

    #[test]
    fn ensure_roots_materializes_owned_roles() {
        let registry = LocationRegistry::default();
        let fs = FileSystem::new();

        registry.ensure_roots(&fs).expect("materializing the roots");

        for role in LocationRole::VIRTUAL {
            assert_eq!(
                fs.exists(role.root()),
                Ok(true),
                "the role root exists in the tree",
            );
        }
    }

    #[test]
    fn display_names() {
        assert_eq!(
            Location::Root(LocationRole::ClassOutput).to_string(),
            "CLASS_OUTPUT",
        );
        assert_eq!(
            Location::Module(LocationRole::ClassOutput, "mod.a".into()).to_string(),
            "CLASS_OUTPUT[mod.a]",
        );
    }
}
