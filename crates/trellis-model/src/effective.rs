//! Cascade resolution of definitions over their parent chains
//!
//! Each configuration key resolves child-overrides-parent independently.
//! Dependency and plugin sets are additive: declarations union across the
//! chain, with the child's declaration replacing the parent's for the same
//! coordinate. Plugin configuration merges per option key.

use crate::{
    Coordinate, DefinitionError, DefinitionResult, DependencyDecl, OptionValue, PluginBinding,
    ProjectDefinition,
};
use log::debug;
use semver::Version;
use std::collections::BTreeMap;

/// A definition after cascade resolution: identity concrete, declarations
/// merged, plugin configuration interpolated. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveDefinition {
    pub coordinate: Coordinate,
    pub version: Version,
    pub dependencies: Vec<DependencyDecl>,
    pub plugins: Vec<PluginBinding>,
    pub properties: BTreeMap<String, String>,
}

impl EffectiveDefinition {
    /// Dependency declarations with the given coordinate removed, used by
    /// callers that need to separate module-to-module edges from external
    /// requests.
    pub fn dependency(&self, coordinate: &Coordinate) -> Option<&DependencyDecl> {
        self.dependencies.iter().find(|d| &d.coordinate == coordinate)
    }
}

/// Resolve the effective definition for `target` against the set of
/// definitions in scope.
///
/// Fails with [`DefinitionError::CyclicParentChain`] when the parent chain
/// revisits a coordinate, [`DefinitionError::UnknownParent`] when a parent
/// reference points outside the scope, and
/// [`DefinitionError::MissingKey`] when no definition in the chain supplies
/// a version.
pub fn effective_definition(
    definitions: &BTreeMap<Coordinate, ProjectDefinition>,
    target: &Coordinate,
) -> DefinitionResult<EffectiveDefinition> {
    let chain = parent_chain(definitions, target)?;

    let mut version = None;
    let mut properties = BTreeMap::new();
    let mut dependencies: BTreeMap<Coordinate, DependencyDecl> = BTreeMap::new();
    let mut plugins: BTreeMap<Coordinate, PluginBinding> = BTreeMap::new();

    // Root ancestor first, target last, so later entries override.
    for definition in chain.iter().rev() {
        if definition.version.is_some() {
            version = definition.version.clone();
        }
        properties.extend(
            definition
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        for dependency in &definition.dependencies {
            dependencies.insert(dependency.coordinate.clone(), dependency.clone());
        }
        for binding in &definition.plugins {
            merge_binding(&mut plugins, binding);
        }
    }

    let version = version.ok_or_else(|| DefinitionError::missing_key(target.to_string(), "version"))?;

    properties.insert("project.group".to_string(), target.group.clone());
    properties.insert("project.name".to_string(), target.name.clone());
    properties.insert("project.version".to_string(), version.to_string());

    let plugins = plugins
        .into_values()
        .map(|binding| interpolate_binding(binding, &properties))
        .collect::<DefinitionResult<Vec<_>>>()?;

    debug!(
        "effective definition for {}: {} dependencies, {} plugins",
        target,
        dependencies.len(),
        plugins.len()
    );

    Ok(EffectiveDefinition {
        coordinate: target.clone(),
        version,
        dependencies: dependencies.into_values().collect(),
        plugins,
        properties,
    })
}

/// Walk the parent chain from target to root, rejecting cycles and dangling
/// parent references.
fn parent_chain<'a>(
    definitions: &'a BTreeMap<Coordinate, ProjectDefinition>,
    target: &Coordinate,
) -> DefinitionResult<Vec<&'a ProjectDefinition>> {
    let mut chain = Vec::new();
    let mut visited = Vec::new();
    let mut current = Some(target.clone());

    while let Some(coordinate) = current {
        if visited.contains(&coordinate) {
            visited.push(coordinate);
            let path = visited
                .iter()
                .map(Coordinate::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(DefinitionError::CyclicParentChain(path));
        }

        let definition = definitions.get(&coordinate).ok_or_else(|| {
            let child = visited
                .last()
                .map(Coordinate::to_string)
                .unwrap_or_else(|| coordinate.to_string());
            DefinitionError::unknown_parent(child, coordinate.to_string())
        })?;

        visited.push(coordinate);
        chain.push(definition);
        current = definition.parent.clone();
    }

    Ok(chain)
}

/// Union a binding into the accumulated set: the child's version replaces
/// the parent's, configuration merges per option key.
fn merge_binding(plugins: &mut BTreeMap<Coordinate, PluginBinding>, binding: &PluginBinding) {
    match plugins.get_mut(&binding.coordinate) {
        Some(existing) => {
            existing.version = binding.version.clone();
            for (key, value) in &binding.configuration {
                existing.configuration.insert(key.clone(), value.clone());
            }
        }
        None => {
            plugins.insert(binding.coordinate.clone(), binding.clone());
        }
    }
}

/// Interpolate `${property}` placeholders in string configuration values
fn interpolate_binding(
    mut binding: PluginBinding,
    properties: &BTreeMap<String, String>,
) -> DefinitionResult<PluginBinding> {
    for value in binding.configuration.values_mut() {
        if let OptionValue::Str(text) = value {
            *text = interpolate(text, properties)?;
        }
    }
    Ok(binding)
}

fn interpolate(text: &str, properties: &BTreeMap<String, String>) -> DefinitionResult<String> {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| DefinitionError::UnknownProperty {
                name: after.to_string(),
                placeholder: text.to_string(),
            })?;
        let name = &after[..end];
        let value = properties
            .get(name)
            .ok_or_else(|| DefinitionError::UnknownProperty {
                name: name.to_string(),
                placeholder: text.to_string(),
            })?;
        result.push_str(value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VersionSpec;
    use pretty_assertions::assert_eq;

    fn scope_of(definitions: Vec<ProjectDefinition>) -> BTreeMap<Coordinate, ProjectDefinition> {
        definitions
            .into_iter()
            .map(|d| (d.coordinate(), d))
            .collect()
    }

    fn coordinate(name: &str) -> Coordinate {
        Coordinate::new("io.trellis", name)
    }

    #[test]
    fn child_value_overrides_parent_per_key() {
        let parent = ProjectDefinition::new("io.trellis", "parent", Version::new(1, 0, 0))
            .with_property("output", "target")
            .with_property("encoding", "utf-8");
        let child = ProjectDefinition::new("io.trellis", "child", Version::new(2, 0, 0))
            .with_parent(coordinate("parent"))
            .with_property("output", "build");

        let effective =
            effective_definition(&scope_of(vec![parent, child]), &coordinate("child")).unwrap();

        assert_eq!(effective.properties.get("output"), Some(&"build".to_string()));
        // Untouched parent keys survive the cascade.
        assert_eq!(
            effective.properties.get("encoding"),
            Some(&"utf-8".to_string())
        );
    }

    #[test]
    fn dependency_sets_union_across_the_chain() {
        let parent = ProjectDefinition::new("io.trellis", "parent", Version::new(1, 0, 0))
            .with_dependency(DependencyDecl::new(
                Coordinate::new("org.example", "logging"),
                VersionSpec::parse("1.0.0").unwrap(),
            ));
        let child = ProjectDefinition::new("io.trellis", "child", Version::new(1, 0, 0))
            .with_parent(coordinate("parent"))
            .with_dependency(DependencyDecl::new(
                Coordinate::new("org.example", "json"),
                VersionSpec::parse("2.0.0").unwrap(),
            ));

        let effective =
            effective_definition(&scope_of(vec![parent, child]), &coordinate("child")).unwrap();

        assert_eq!(effective.dependencies.len(), 2);
    }

    #[test]
    fn version_inherited_when_child_omits_it() {
        let parent = ProjectDefinition::new("io.trellis", "parent", Version::new(3, 1, 0));
        let mut child = ProjectDefinition::new("io.trellis", "child", Version::new(0, 0, 0))
            .with_parent(coordinate("parent"));
        child.version = None;

        let effective =
            effective_definition(&scope_of(vec![parent, child]), &coordinate("child")).unwrap();
        assert_eq!(effective.version, Version::new(3, 1, 0));
    }

    #[test]
    fn missing_version_after_cascade_is_an_error() {
        let mut definition = ProjectDefinition::new("io.trellis", "core", Version::new(0, 0, 0));
        definition.version = None;

        let result = effective_definition(&scope_of(vec![definition]), &coordinate("core"));
        assert!(matches!(result, Err(DefinitionError::MissingKey { .. })));
    }

    #[test]
    fn cyclic_parent_chain_is_rejected() {
        let a = ProjectDefinition::new("io.trellis", "a", Version::new(1, 0, 0))
            .with_parent(coordinate("b"));
        let b = ProjectDefinition::new("io.trellis", "b", Version::new(1, 0, 0))
            .with_parent(coordinate("a"));

        let result = effective_definition(&scope_of(vec![a, b]), &coordinate("a"));
        match result {
            Err(DefinitionError::CyclicParentChain(path)) => {
                assert!(path.contains("io.trellis:a"));
                assert!(path.contains("io.trellis:b"));
            }
            other => panic!("expected cyclic parent chain, got {:?}", other),
        }
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let child = ProjectDefinition::new("io.trellis", "child", Version::new(1, 0, 0))
            .with_parent(coordinate("ghost"));

        let result = effective_definition(&scope_of(vec![child]), &coordinate("child"));
        assert!(matches!(result, Err(DefinitionError::UnknownParent { .. })));
    }

    #[test]
    fn plugin_configuration_merges_per_option_key() {
        let parent = ProjectDefinition::new("io.trellis", "parent", Version::new(1, 0, 0))
            .with_plugin(
                PluginBinding::new(
                    Coordinate::new("io.trellis.plugins", "compile"),
                    VersionSpec::parse("1.0.0").unwrap(),
                )
                .with_option("release", true)
                .with_option("target", "out"),
            );
        let child = ProjectDefinition::new("io.trellis", "child", Version::new(1, 0, 0))
            .with_parent(coordinate("parent"))
            .with_plugin(
                PluginBinding::new(
                    Coordinate::new("io.trellis.plugins", "compile"),
                    VersionSpec::parse("1.1.0").unwrap(),
                )
                .with_option("release", false),
            );

        let effective =
            effective_definition(&scope_of(vec![parent, child]), &coordinate("child")).unwrap();

        let binding = &effective.plugins[0];
        assert_eq!(binding.version, VersionSpec::parse("1.1.0").unwrap());
        assert_eq!(
            binding.configuration.get("release"),
            Some(&OptionValue::Bool(false))
        );
        assert_eq!(
            binding.configuration.get("target"),
            Some(&OptionValue::Str("out".to_string()))
        );
    }

    #[test]
    fn properties_interpolate_into_plugin_configuration() {
        let definition = ProjectDefinition::new("io.trellis", "core", Version::new(1, 4, 0))
            .with_property("archive.dir", "dist")
            .with_plugin(
                PluginBinding::new(
                    Coordinate::new("io.trellis.plugins", "archive"),
                    VersionSpec::parse("1.0.0").unwrap(),
                )
                .with_option("output", "${archive.dir}/${project.name}-${project.version}"),
            );

        let effective =
            effective_definition(&scope_of(vec![definition]), &coordinate("core")).unwrap();

        assert_eq!(
            effective.plugins[0].configuration.get("output"),
            Some(&OptionValue::Str("dist/core-1.4.0".to_string()))
        );
    }

    #[test]
    fn unknown_property_placeholder_is_rejected() {
        let definition = ProjectDefinition::new("io.trellis", "core", Version::new(1, 0, 0))
            .with_plugin(
                PluginBinding::new(
                    Coordinate::new("io.trellis.plugins", "archive"),
                    VersionSpec::parse("1.0.0").unwrap(),
                )
                .with_option("output", "${no.such.property}"),
            );

        let result = effective_definition(&scope_of(vec![definition]), &coordinate("core"));
        assert!(matches!(result, Err(DefinitionError::UnknownProperty { .. })));
    }
}
