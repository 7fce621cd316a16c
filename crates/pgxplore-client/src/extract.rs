//! Declarative projection of hierarchical documents into flat records.
//!
//! A specialized client supplies an [`ExtractionPlan`]: one path naming the
//! record boundary plus a field rule per output field. The walking algorithm
//! here is written once and reused by every hierarchical-response client.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::document::{Document, Element};

/// One step of a [`NodePath`]: an element name, optionally constrained to a
/// specific attribute value (the `[@Type="Preferred"]` style of predicate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    name: String,
    attr_equals: Option<(String, String)>,
}

impl PathStep {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attr_equals: None,
        }
    }

    pub fn with_attr(mut self, attr: impl Into<String>, value: impl Into<String>) -> Self {
        self.attr_equals = Some((attr.into(), value.into()));
        self
    }

    fn matches(&self, element: &Element) -> bool {
        if element.name() != self.name {
            return false;
        }
        match &self.attr_equals {
            Some((attr, value)) => element.attr(attr) == Some(value.as_str()),
            None => true,
        }
    }
}

/// Relative location inside a document subtree.
///
/// The first step is searched among all descendants of the scope node;
/// each following step matches direct children of the previous match. An
/// empty path resolves to the scope node itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodePath {
    steps: Vec<PathStep>,
}

impl NodePath {
    pub fn new(steps: impl IntoIterator<Item = PathStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Path of plain element names with no attribute predicates.
    pub fn names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self::new(names.into_iter().map(|name| PathStep::named(name)))
    }

    /// Path that resolves to the scope node itself.
    pub fn here() -> Self {
        Self::default()
    }

    /// All matches in document order.
    fn resolve_all<'a>(&self, scope: &'a Element) -> Vec<&'a Element> {
        let mut current: Vec<&Element> = vec![scope];
        for (index, step) in self.steps.iter().enumerate() {
            let mut next = Vec::new();
            for element in current {
                if index == 0 {
                    next.extend(element.descendants().filter(|e| step.matches(e)));
                } else {
                    next.extend(element.children().iter().filter(|e| step.matches(e)));
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }
        current
    }

    fn resolve_first<'a>(&self, scope: &'a Element) -> Option<&'a Element> {
        self.resolve_all(scope).into_iter().next()
    }
}

/// Where a field's value comes from once its node is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Directly contained text of the node.
    Text,
    /// A named attribute of the node.
    Attribute(String),
}

/// Whether a field resolves to one value or an ordered sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Declarative rule mapping a document location to one record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    name: String,
    path: NodePath,
    source: ValueSource,
    cardinality: Cardinality,
    prefix: Option<String>,
}

impl FieldRule {
    pub fn text(name: impl Into<String>, path: NodePath) -> Self {
        Self {
            name: name.into(),
            path,
            source: ValueSource::Text,
            cardinality: Cardinality::One,
            prefix: None,
        }
    }

    pub fn attribute(name: impl Into<String>, path: NodePath, attr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path,
            source: ValueSource::Attribute(attr.into()),
            cardinality: Cardinality::One,
            prefix: None,
        }
    }

    /// Collect every match as an ordered list instead of the first one.
    pub fn repeated(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }

    /// Prepend a fixed prefix to each extracted value.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn value_of(&self, element: &Element) -> Option<String> {
        let raw = match &self.source {
            ValueSource::Text => {
                let text = element.text().trim();
                if text.is_empty() {
                    return None;
                }
                text.to_owned()
            }
            ValueSource::Attribute(attr) => element.attr(attr)?.to_owned(),
        };
        Some(match &self.prefix {
            Some(prefix) => format!("{prefix}{raw}"),
            None => raw,
        })
    }

    fn apply(&self, boundary: &Element, record: &mut ExtractedRecord) {
        match self.cardinality {
            Cardinality::One => {
                if let Some(value) = self
                    .path
                    .resolve_first(boundary)
                    .and_then(|element| self.value_of(element))
                {
                    record
                        .fields
                        .insert(self.name.clone(), FieldValue::Scalar(value));
                }
            }
            Cardinality::Many => {
                // Document order, no deduplication.
                let values: Vec<String> = self
                    .path
                    .resolve_all(boundary)
                    .into_iter()
                    .filter_map(|element| self.value_of(element))
                    .collect();
                if !values.is_empty() {
                    record
                        .fields
                        .insert(self.name.clone(), FieldValue::List(values));
                }
            }
        }
    }
}

/// A resolved field value: scalar or ordered sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

/// One flat record projected out of a hierarchical document.
///
/// Absence of a field is significant: a field whose path did not resolve is
/// omitted, never defaulted to an empty value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct ExtractedRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl ExtractedRecord {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<&str> {
        match self.fields.get(name)? {
            FieldValue::Scalar(value) => Some(value),
            FieldValue::List(_) => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.fields.get(name)? {
            FieldValue::List(values) => Some(values),
            FieldValue::Scalar(_) => None,
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Record boundary plus field rules for one kind of document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPlan {
    record_boundary: NodePath,
    fields: Vec<FieldRule>,
}

impl ExtractionPlan {
    pub fn new(record_boundary: NodePath, fields: Vec<FieldRule>) -> Self {
        Self {
            record_boundary,
            fields,
        }
    }

    /// Projects every record-boundary match into a record. Matches where no
    /// field resolves at all are dropped rather than surfaced as noise.
    pub fn extract(&self, document: &Document) -> Vec<ExtractedRecord> {
        let mut records = Vec::new();
        for boundary in self.record_boundary.resolve_all(document.root()) {
            let mut record = ExtractedRecord::default();
            for rule in &self.fields {
                rule.apply(boundary, &mut record);
            }
            if !record.is_empty() {
                records.push(record);
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Document {
        Document::parse(input).expect("test document should parse")
    }

    fn condition_plan() -> ExtractionPlan {
        ExtractionPlan::new(
            NodePath::names(["Record"]),
            vec![
                FieldRule::text("significance", NodePath::names(["Significance"])),
                FieldRule::text("condition", NodePath::names(["Condition"])).repeated(),
            ],
        )
    }

    #[test]
    fn fields_resolve_relative_to_each_boundary_node() {
        let doc = parse(
            "<Result>\
               <Record><Significance>Pathogenic</Significance></Record>\
               <Record><Significance>Benign</Significance></Record>\
             </Result>",
        );

        let records = condition_plan().extract(&doc);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].scalar("significance"), Some("Pathogenic"));
        assert_eq!(records[1].scalar("significance"), Some("Benign"));
    }

    #[test]
    fn boundary_with_no_resolvable_fields_is_dropped() {
        let doc = parse(
            "<Result>\
               <Record><Significance>Pathogenic</Significance></Record>\
               <Record><Unrelated/></Record>\
               <Record><Significance>Benign</Significance></Record>\
             </Result>",
        );

        let records = condition_plan().extract(&doc);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn repeated_fields_preserve_document_order_without_dedup() {
        let doc = parse(
            "<Result><Record>\
               <Condition>Long QT syndrome</Condition>\
               <Condition>Brugada syndrome</Condition>\
               <Condition>Long QT syndrome</Condition>\
             </Record></Result>",
        );

        let records = condition_plan().extract(&doc);
        assert_eq!(
            records[0].list("condition"),
            Some(
                &[
                    String::from("Long QT syndrome"),
                    String::from("Brugada syndrome"),
                    String::from("Long QT syndrome"),
                ][..]
            )
        );
    }

    #[test]
    fn unresolved_field_is_omitted_not_defaulted() {
        let doc = parse("<Result><Record><Condition>Gitelman</Condition></Record></Result>");
        let records = condition_plan().extract(&doc);
        assert_eq!(records[0].get("significance"), None);
        assert_eq!(records[0].len(), 1);
    }

    #[test]
    fn empty_text_counts_as_unresolved() {
        let doc = parse("<Result><Record><Significance>  </Significance></Record></Result>");
        let records = condition_plan().extract(&doc);
        assert!(records.is_empty());
    }

    #[test]
    fn attribute_predicate_selects_among_siblings() {
        let doc = parse(
            r#"<Result><Record>
                 <Name><Value Type="Alternate">alt</Value><Value Type="Preferred">NM_000546.6</Value></Name>
               </Record></Result>"#,
        );
        let plan = ExtractionPlan::new(
            NodePath::names(["Record"]),
            vec![FieldRule::text(
                "preferred",
                NodePath::new([
                    PathStep::named("Name"),
                    PathStep::named("Value").with_attr("Type", "Preferred"),
                ]),
            )],
        );

        let records = plan.extract(&doc);
        assert_eq!(records[0].scalar("preferred"), Some("NM_000546.6"));
    }

    #[test]
    fn records_serialize_as_flat_json_objects() {
        let doc = parse(
            "<Result><Record>\
               <Significance>Pathogenic</Significance>\
               <Condition>Long QT syndrome</Condition>\
               <Condition>Brugada syndrome</Condition>\
             </Record></Result>",
        );

        let records = condition_plan().extract(&doc);
        let json = serde_json::to_value(&records[0]).expect("record should serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "significance": "Pathogenic",
                "condition": ["Long QT syndrome", "Brugada syndrome"],
            })
        );
    }

    #[test]
    fn empty_path_resolves_to_the_boundary_itself() {
        let doc = parse(r#"<Result><Record ID="117"><Significance>VUS</Significance></Record></Result>"#);
        let plan = ExtractionPlan::new(
            NodePath::names(["Record"]),
            vec![FieldRule::attribute("id", NodePath::here(), "ID").with_prefix("rcv")],
        );

        let records = plan.extract(&doc);
        assert_eq!(records[0].scalar("id"), Some("rcv117"));
    }
}
