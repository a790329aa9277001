//! Core data models used throughout the curriculum service.
//!
//! These types are read-only projections of bucket content: they are built
//! per request from fetched bytes and discarded once the response has been
//! serialized.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::grade::{Grade, Term};

/// A single content unit under a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_concepts: Vec<SubConcept>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exercises: Vec<Exercise>,
    /// Filled in by the resolver, never read from stored files.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub term: Option<Term>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubConcept {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exercises: Vec<Exercise>,
}

/// An exercise linked to a concept (and optionally a sub-concept).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(default)]
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_concept_name: Option<String>,
}

/// Shape of `…/concepts/unified_curriculum.json` in the bucket.
///
/// Concepts are kept as raw JSON so one malformed entry can be skipped
/// without rejecting the whole file.
#[derive(Debug, Deserialize)]
pub struct ConceptFile {
    #[serde(default)]
    pub concepts: Vec<Value>,
}

/// Shape of a bundled fallback file (`data/fallback/P5.json`).
#[derive(Debug, Deserialize)]
pub struct FallbackFile {
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub terms: BTreeMap<String, BTreeMap<String, Vec<Value>>>,
}

/// Term → subject → concepts.
pub type CurriculumTree = BTreeMap<Term, BTreeMap<String, Vec<Concept>>>;

/// Where a response's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Storage,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeList {
    pub grades: Vec<Grade>,
    pub source: ContentSource,
}

/// Term and subject layout of a grade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeStructure {
    pub grade: Grade,
    pub terms: BTreeMap<Term, Vec<String>>,
}

impl GradeStructure {
    /// Derive the structure from a full content tree.
    pub fn from_tree(grade: Grade, tree: &CurriculumTree) -> Self {
        let terms = tree
            .iter()
            .map(|(term, subjects)| (*term, subjects.keys().cloned().collect()))
            .collect();
        Self { grade, terms }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StructureResponse {
    #[serde(flatten)]
    pub structure: GradeStructure,
    pub source: ContentSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_file: Option<String>,
}

/// Curriculum for a whole grade.
///
/// From storage only the structure is returned (concepts are fetched per
/// subject). From the fallback path the full `content` tree is included,
/// along with the file that served it.
#[derive(Debug, Clone, Serialize)]
pub struct GradeCurriculum {
    pub grade: Grade,
    pub source: ContentSource,
    pub structure: GradeStructure,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<CurriculumTree>,
}

/// Concepts of one subject. `fallback_file` names the bundled file that
/// served them, which may belong to another grade under the default
/// unbundled-grade policy.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectConcepts {
    pub grade: Grade,
    pub term: Term,
    pub subject: String,
    pub source: ContentSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_file: Option<String>,
    pub concepts: Vec<Concept>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConceptResponse {
    pub grade: Grade,
    pub source: ContentSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_file: Option<String>,
    pub concept: Concept,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub grade: Grade,
    pub count: usize,
    /// Bundled files that contributed to the searched pool, if any.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fallback_files: Vec<String>,
    pub results: Vec<Concept>,
}

/// Parse raw concept values, skipping (and logging) entries that do not fit
/// the [`Concept`] shape. `origin` names the file in the warning.
pub fn parse_concepts(values: Vec<Value>, origin: &str) -> Vec<Concept> {
    let total = values.len();
    let concepts: Vec<Concept> = values
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value::<Concept>(value) {
            Ok(concept) => Some(concept),
            Err(e) => {
                tracing::warn!(origin, index = i, error = %e, "skipping malformed concept");
                None
            }
        })
        .collect();
    if concepts.len() < total {
        tracing::warn!(
            origin,
            kept = concepts.len(),
            skipped = total - concepts.len(),
            "concept listing had malformed entries"
        );
    }
    concepts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_concepts_skips_malformed_entries() {
        let values = vec![
            json!({"name": "Fractions", "description": "Parts of a whole"}),
            json!({"description": "no name"}),
            json!("not an object"),
            json!({"name": "Decimals", "examples": ["0.5"]}),
        ];
        let concepts = parse_concepts(values, "test.json");
        let names: Vec<&str> = concepts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Fractions", "Decimals"]);
        assert_eq!(concepts[1].examples, vec!["0.5".to_string()]);
    }

    #[test]
    fn test_concept_serialization_omits_empty_fields() {
        let concept = Concept {
            name: "Area".to_string(),
            description: "Space inside a shape".to_string(),
            examples: Vec::new(),
            sub_concepts: Vec::new(),
            exercises: Vec::new(),
            term: Some(Term::Term2),
            subject: None,
        };
        let value = serde_json::to_value(&concept).unwrap();
        assert_eq!(
            value,
            json!({"name": "Area", "description": "Space inside a shape", "term": "Term2"})
        );
    }

    #[test]
    fn test_structure_from_tree_keeps_subject_order() {
        let mut tree = CurriculumTree::new();
        let mut subjects = BTreeMap::new();
        subjects.insert("Science".to_string(), Vec::new());
        subjects.insert("Mathematics".to_string(), Vec::new());
        tree.insert(Term::Term1, subjects);

        let structure = GradeStructure::from_tree(Grade::P5, &tree);
        assert_eq!(
            structure.terms[&Term::Term1],
            vec!["Mathematics".to_string(), "Science".to_string()]
        );
    }
}
