// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! CloudFormation synthesis model.
//!
//! Constructs register resources through a [`Scope`], which tracks the
//! construct path (`<stack>/<id>/<id>...`). Every resource gets a stable
//! logical ID derived from that path, so synthesizing the same inputs twice
//! yields byte-identical templates.
//!
//! ```text
//! Stack ─ root() ─> Scope("VpcCore") ─ child() ─> Scope("VpcCore/MyappVpc")
//!                                                   └─ add("Resource", AWS::EC2::VPC)
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use crate::errors::StackError;
use crate::models::{RemovalPolicy, SuppressionRecord, SuppressionScope};

pub const PATH_METADATA_KEY: &str = "aws:cdk:path";
pub const NAG_METADATA_KEY: &str = "cdk_nag";

/// Resource types that accept stack-level tags.
const TAGGABLE_TYPES: [&str; 12] = [
    "AWS::EC2::EIP",
    "AWS::EC2::FlowLog",
    "AWS::EC2::InternetGateway",
    "AWS::EC2::NatGateway",
    "AWS::EC2::NetworkAcl",
    "AWS::EC2::RouteTable",
    "AWS::EC2::SecurityGroup",
    "AWS::EC2::Subnet",
    "AWS::EC2::VPC",
    "AWS::IAM::Role",
    "AWS::KMS::Key",
    "AWS::Logs::LogGroup",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnResource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl CfnResource {
    /// `properties` must be a JSON object; anything else is treated as empty.
    pub fn new(resource_type: &str, properties: Value) -> Self {
        let properties = match properties {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: Vec::new(),
            update_replace_policy: None,
            deletion_policy: None,
            metadata: Map::new(),
        }
    }

    pub fn depends_on(mut self, logical_id: &str) -> Self {
        if !self.depends_on.iter().any(|id| id == logical_id) {
            self.depends_on.push(logical_id.to_string());
            self.depends_on.sort();
        }
        self
    }

    pub fn removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.update_replace_policy = Some(policy);
        self.deletion_policy = Some(policy);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn path(&self) -> Option<&str> {
        self.metadata.get(PATH_METADATA_KEY).and_then(Value::as_str)
    }

    fn apply_tags(&mut self, tags: &BTreeMap<String, String>) {
        if tags.is_empty() || !TAGGABLE_TYPES.contains(&self.resource_type.as_str()) {
            return;
        }

        let mut merged: BTreeMap<String, Value> = BTreeMap::new();
        if let Some(Value::Array(existing)) = self.properties.get("Tags") {
            for tag in existing {
                if let (Some(key), Some(value)) = (tag["Key"].as_str(), tag.get("Value")) {
                    merged.insert(key.to_string(), value.clone());
                }
            }
        }
        for (key, value) in tags {
            merged.entry(key.clone()).or_insert_with(|| json!(value));
        }

        let tags: Vec<Value> = merged
            .into_iter()
            .map(|(key, value)| json!({"Key": key, "Value": value}))
            .collect();
        self.properties.insert("Tags".to_string(), Value::Array(tags));
    }

    fn add_suppression(&mut self, record: &SuppressionRecord) {
        let nag = self
            .metadata
            .entry(NAG_METADATA_KEY)
            .or_insert_with(|| json!({"rules_to_suppress": []}));
        if let Some(Value::Array(rules)) = nag.get_mut("rules_to_suppress") {
            rules.push(record.to_metadata());
        }
    }
}

/// The synthesized template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub resources: BTreeMap<String, CfnResource>,
}

impl Template {
    pub fn to_json(&self) -> Result<String, StackError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_value(&self) -> Result<Value, StackError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a CfnResource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.resource_type == resource_type)
    }

    pub fn count_of_type(&self, resource_type: &str) -> usize {
        self.resources_of_type(resource_type).count()
    }

    pub fn resource_at_path(&self, path: &str) -> Option<(&String, &CfnResource)> {
        self.resources
            .iter()
            .find(|(_, resource)| resource.path() == Some(path))
    }
}

/// Root of a construct tree: resources, stack-wide tags and suppressions.
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    description: Option<String>,
    resources: BTreeMap<String, CfnResource>,
    paths: BTreeMap<String, String>,
    tags: BTreeMap<String, String>,
    suppressions: Vec<SuppressionRecord>,
}

impl Stack {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            resources: BTreeMap::new(),
            paths: BTreeMap::new(),
            tags: BTreeMap::new(),
            suppressions: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&mut self) -> Scope<'_> {
        Scope {
            stack: self,
            path: Vec::new(),
        }
    }

    pub fn add_tag(&mut self, key: &str, value: &str) {
        self.tags.insert(key.to_string(), value.to_string());
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn add_suppression(&mut self, record: SuppressionRecord) {
        self.suppressions.push(record);
    }

    pub fn suppressions(&self) -> &[SuppressionRecord] {
        &self.suppressions
    }

    pub fn resource(&self, logical_id: &str) -> Option<&CfnResource> {
        self.resources.get(logical_id)
    }

    pub fn logical_id_at(&self, path: &str) -> Option<&str> {
        self.paths.get(path).map(String::as_str)
    }

    /// Lowers the tree into a template, applying tags and suppressions.
    ///
    /// A path-scoped suppression that matches no resource is an error rather
    /// than a silent no-op.
    pub fn synth(&self) -> Result<Template, StackError> {
        let mut resources = self.resources.clone();
        for resource in resources.values_mut() {
            resource.apply_tags(&self.tags);
        }

        let mut stack_rules: Vec<Value> = Vec::new();
        for record in &self.suppressions {
            match &record.scope {
                SuppressionScope::Stack => stack_rules.push(record.to_metadata()),
                SuppressionScope::Path(path) => {
                    let logical_id = self.paths.get(path).ok_or_else(|| {
                        StackError::InvalidTopology(format!(
                            "suppression path did not match any resource: {path}"
                        ))
                    })?;
                    if let Some(resource) = resources.get_mut(logical_id) {
                        resource.add_suppression(record);
                    }
                }
            }
        }

        let mut metadata = Map::new();
        if !stack_rules.is_empty() {
            metadata.insert(
                NAG_METADATA_KEY.to_string(),
                json!({"rules_to_suppress": stack_rules}),
            );
        }

        Ok(Template {
            description: self.description.clone(),
            metadata,
            resources,
        })
    }
}

/// A position in the construct tree.
pub struct Scope<'a> {
    stack: &'a mut Stack,
    path: Vec<String>,
}

impl Scope<'_> {
    pub fn child(&mut self, id: &str) -> Scope<'_> {
        let mut path = self.path.clone();
        path.push(id.to_string());
        Scope {
            stack: &mut *self.stack,
            path,
        }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack.name
    }

    /// Full construct path of this scope, starting with the stack name.
    pub fn path(&self) -> String {
        std::iter::once(self.stack.name.as_str())
            .chain(self.path.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn path_of(&self, id: &str) -> String {
        format!("{}/{}", self.path(), id)
    }

    /// Registers `resource` at `<path>/<id>` and returns its logical ID.
    pub fn add(&mut self, id: &str, mut resource: CfnResource) -> Result<String, StackError> {
        let mut components = self.path.clone();
        components.push(id.to_string());

        let full_path = self.path_of(id);
        if self.stack.paths.contains_key(&full_path) {
            return Err(StackError::DuplicateConstruct(full_path));
        }

        let logical_id = logical_id(&components);
        if self.stack.resources.contains_key(&logical_id) {
            return Err(StackError::DuplicateConstruct(logical_id));
        }

        tracing::debug!(
            "[stack] {} {} ({})",
            resource.resource_type,
            full_path,
            logical_id
        );

        resource
            .metadata
            .insert(PATH_METADATA_KEY.to_string(), json!(full_path));
        self.stack.paths.insert(full_path, logical_id.clone());
        self.stack.resources.insert(logical_id.clone(), resource);

        Ok(logical_id)
    }

    pub fn add_resource(
        &mut self,
        id: &str,
        resource_type: &str,
        properties: Value,
    ) -> Result<String, StackError> {
        self.add(id, CfnResource::new(resource_type, properties))
    }

    /// Records a suppression on the owning stack; resolved at synth time.
    pub fn add_suppression(&mut self, record: SuppressionRecord) {
        self.stack.add_suppression(record);
    }
}

/// Human readable part of the path plus an 8 hex digit hash of the full path.
pub fn logical_id(components: &[String]) -> String {
    let human: String = components
        .iter()
        .filter(|c| c.as_str() != "Resource" && c.as_str() != "Default")
        .flat_map(|c| c.chars().filter(char::is_ascii_alphanumeric))
        .collect();

    let digest = Sha256::digest(components.join("/").as_bytes());
    let hash: String = digest.iter().take(4).map(|b| format!("{b:02X}")).collect();

    format!("{human}{hash}")
}

pub fn reference(logical_id: &str) -> Value {
    json!({"Ref": logical_id})
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({"Fn::GetAtt": [logical_id, attribute]})
}

pub fn sub(template: &str) -> Value {
    json!({"Fn::Sub": template})
}

pub fn join(parts: Vec<Value>) -> Value {
    json!({"Fn::Join": ["", parts]})
}

/// The `index`th availability zone of the deployment region.
pub fn select_az(index: usize) -> Value {
    json!({"Fn::Select": [index, {"Fn::GetAZs": ""}]})
}

/// `com.amazonaws.<region>.<service>` for the deployment region.
pub fn service_name(service: &str) -> Value {
    join(vec![
        json!("com.amazonaws."),
        reference("AWS::Region"),
        json!(format!(".{service}")),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn components(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_logical_id_drops_resource_and_strips_symbols() {
        let id = logical_id(&components(&["VpcCore", "MyappVpc", "Resource"]));
        assert!(id.starts_with("VpcCoreMyappVpc"));
        assert_eq!(id.len(), "VpcCoreMyappVpc".len() + 8);

        let id = logical_id(&components(&["AppSG", "from AlbSG:80"]));
        assert!(id.starts_with("AppSGfromAlbSG80"));
    }

    #[test]
    fn test_logical_id_distinguishes_paths() {
        let a = logical_id(&components(&["A", "Resource"]));
        let b = logical_id(&components(&["A"]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_scope_paths_and_duplicates() {
        let mut stack = Stack::new("test-stack");
        let mut root = stack.root();
        let mut core = root.child("VpcCore");
        assert_eq!(core.path(), "test-stack/VpcCore");

        let id = core
            .add_resource("Resource", "AWS::EC2::VPC", json!({"CidrBlock": "10.0.0.0/16"}))
            .unwrap();
        let err = core
            .add_resource("Resource", "AWS::EC2::VPC", json!({}))
            .unwrap_err();
        assert_eq!(
            err,
            StackError::DuplicateConstruct("test-stack/VpcCore/Resource".to_string())
        );

        assert_eq!(stack.logical_id_at("test-stack/VpcCore/Resource"), Some(id.as_str()));
        let resource = stack.resource(&id).unwrap();
        assert_eq!(resource.path(), Some("test-stack/VpcCore/Resource"));
    }

    #[test]
    fn test_synth_applies_tags_to_taggable_only() {
        let mut stack = Stack::new("s");
        {
            let mut root = stack.root();
            root.add_resource(
                "Vpc",
                "AWS::EC2::VPC",
                json!({"Tags": [{"Key": "Name", "Value": "s/Vpc"}]}),
            )
            .unwrap();
            root.add_resource("Route", "AWS::EC2::Route", json!({}))
                .unwrap();
        }
        stack.add_tag("Project", "myapp");
        stack.add_tag("Environment", "dev");

        let template = stack.synth().unwrap();
        let (_, vpc) = template.resource_at_path("s/Vpc").unwrap();
        assert_eq!(
            vpc.property("Tags").unwrap(),
            &json!([
                {"Key": "Environment", "Value": "dev"},
                {"Key": "Name", "Value": "s/Vpc"},
                {"Key": "Project", "Value": "myapp"},
            ])
        );
        let (_, route) = template.resource_at_path("s/Route").unwrap();
        assert!(route.property("Tags").is_none());
    }

    #[test]
    fn test_synth_places_suppressions() {
        let mut stack = Stack::new("s");
        stack
            .root()
            .add_resource("Vpc", "AWS::EC2::VPC", json!({}))
            .unwrap();
        stack.add_suppression(SuppressionRecord::stack("Rule-1", "stack wide"));
        stack.add_suppression(SuppressionRecord::path("Rule-2", "s/Vpc", "one resource"));

        let template = stack.synth().unwrap();
        assert_eq!(
            template.metadata[NAG_METADATA_KEY],
            json!({"rules_to_suppress": [{"id": "Rule-1", "reason": "stack wide"}]})
        );
        let (_, vpc) = template.resource_at_path("s/Vpc").unwrap();
        assert_eq!(
            vpc.metadata[NAG_METADATA_KEY],
            json!({"rules_to_suppress": [{"id": "Rule-2", "reason": "one resource"}]})
        );
    }

    #[test]
    fn test_synth_rejects_dangling_suppression_path() {
        let mut stack = Stack::new("s");
        stack.add_suppression(SuppressionRecord::path("Rule-2", "s/Missing", "nothing"));
        assert!(matches!(
            stack.synth(),
            Err(StackError::InvalidTopology(_))
        ));
    }

    #[test]
    fn test_resource_attributes_serialize_in_cloudformation_shape() {
        let resource = CfnResource::new("AWS::Logs::LogGroup", json!({"RetentionInDays": 365}))
            .depends_on("B")
            .depends_on("A")
            .depends_on("B")
            .removal_policy(RemovalPolicy::Retain);
        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value["Type"], "AWS::Logs::LogGroup");
        assert_eq!(value["DependsOn"], json!(["A", "B"]));
        assert_eq!(value["DeletionPolicy"], "Retain");
        assert_eq!(value["UpdateReplacePolicy"], "Retain");
        assert!(value.get("Metadata").is_none());
    }

    #[test]
    fn test_service_name() {
        assert_eq!(
            service_name("s3"),
            json!({"Fn::Join": ["", ["com.amazonaws.", {"Ref": "AWS::Region"}, ".s3"]]})
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_logical_id_is_alphanumeric_and_stable(parts in proptest::collection::vec("[A-Za-z0-9 :/-]{1,12}", 1..5)) {
            let id = logical_id(&parts);
            prop_assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
            prop_assert_eq!(logical_id(&parts), id);
        }
    }
}
