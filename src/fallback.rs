//! Bundled fallback curriculum files.
//!
//! When the bucket cannot answer, content is read from `{dir}/{GRADE}.json`
//! (the repository ships `data/fallback/P5.json` and `P6.json`). A grade
//! without a bundled file is handled by the configured
//! [`UnbundledPolicy`]:
//!
//! - `default` serves `default_grade`'s file and logs a warning naming
//!   both grades;
//! - `reject` answers not-found.
//!
//! A file that should exist but does not (including the default grade's) is
//! reported as [`CurriculumError::FallbackUnavailable`].
//!
//! Files are read on every call; nothing is cached between requests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::{FallbackConfig, UnbundledPolicy};
use crate::error::CurriculumError;
use crate::grade::{Grade, Term};
use crate::models::{parse_concepts, CurriculumTree, FallbackFile};

/// Content read from a fallback file.
#[derive(Debug, Clone)]
pub struct FallbackContent {
    /// File name that served the content, e.g. `P5.json`.
    pub file_name: String,
    pub tree: CurriculumTree,
}

#[derive(Debug, Clone)]
pub struct FallbackLibrary {
    dir: PathBuf,
    default_grade: Grade,
    policy: UnbundledPolicy,
}

impl FallbackLibrary {
    pub fn new(dir: impl Into<PathBuf>, default_grade: Grade, policy: UnbundledPolicy) -> Self {
        Self {
            dir: dir.into(),
            default_grade,
            policy,
        }
    }

    /// Build from validated configuration.
    pub fn from_config(config: &FallbackConfig) -> Self {
        let default_grade = config.default_grade().unwrap_or(Grade::P5);
        Self::new(config.dir.clone(), default_grade, config.unbundled)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(grade: Grade) -> String {
        format!("{}.json", grade.code())
    }

    pub fn path_for(&self, grade: Grade) -> PathBuf {
        self.dir.join(Self::file_name(grade))
    }

    pub fn is_bundled(&self, grade: Grade) -> bool {
        self.path_for(grade).is_file()
    }

    /// Grades with a bundled file, in curriculum order. Only exact
    /// `{code}.json` names count, the same names [`load`](Self::load) opens.
    pub fn bundled_grades(&self) -> Vec<Grade> {
        let mut grades: Vec<Grade> = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    return None;
                }
                let stem = path.file_stem().and_then(|s| s.to_str())?;
                Grade::from_code(stem).filter(|grade| grade.code() == stem)
            })
            .collect();
        grades.sort();
        grades.dedup();
        grades
    }

    /// Decide which grade's file serves `requested`.
    pub fn resolve_grade(&self, requested: Grade) -> Result<Grade, CurriculumError> {
        if self.is_bundled(requested) {
            return Ok(requested);
        }
        match self.policy {
            UnbundledPolicy::Default => {
                tracing::warn!(
                    requested = %requested,
                    serving = %self.default_grade,
                    "no bundled fallback for grade, serving default grade content"
                );
                Ok(self.default_grade)
            }
            UnbundledPolicy::Reject => Err(CurriculumError::not_found(format!(
                "no fallback content bundled for grade {}",
                requested
            ))),
        }
    }

    /// Load the fallback content that serves `requested`.
    pub async fn load(&self, requested: Grade) -> Result<FallbackContent, CurriculumError> {
        let served = self.resolve_grade(requested)?;
        let path = self.path_for(served);
        let origin = path.display().to_string();

        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            tracing::error!(path = %origin, error = %e, "fallback file unreadable");
            CurriculumError::FallbackUnavailable(format!("{}: {}", origin, e))
        })?;
        let file: FallbackFile = serde_json::from_str(&raw).map_err(|e| {
            tracing::error!(path = %origin, error = %e, "fallback file is not valid JSON");
            CurriculumError::FallbackUnavailable(format!("{}: malformed JSON: {}", origin, e))
        })?;

        if let Some(ref declared) = file.grade {
            if Grade::from_code(declared) != Some(served) {
                tracing::warn!(path = %origin, declared = %declared, expected = %served, "fallback file declares a different grade");
            }
        }

        tracing::info!(requested = %requested, file = %origin, "serving fallback curriculum");
        Ok(FallbackContent {
            file_name: Self::file_name(served),
            tree: build_tree(file, &origin),
        })
    }
}

fn build_tree(file: FallbackFile, origin: &str) -> CurriculumTree {
    let mut tree: CurriculumTree = BTreeMap::new();
    for (term_key, subjects) in file.terms {
        let term = match term_key.parse::<Term>() {
            Ok(term) => term,
            Err(e) => {
                tracing::warn!(origin, error = %e, "skipping unrecognised term in fallback file");
                continue;
            }
        };
        let entry = tree.entry(term).or_default();
        for (subject, values) in subjects {
            let mut concepts = parse_concepts(values, origin);
            for concept in &mut concepts {
                concept.term = Some(term);
                concept.subject = Some(subject.clone());
            }
            entry.insert(subject, concepts);
        }
    }
    tree
}

/// Case-insensitive subject lookup within one term of a tree.
pub fn find_subject<'a, V>(subjects: &'a BTreeMap<String, V>, subject: &str) -> Option<(&'a String, &'a V)> {
    subjects
        .get_key_value(subject)
        .or_else(|| {
            let wanted = subject.to_lowercase();
            subjects.iter().find(|(name, _)| name.to_lowercase() == wanted)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const P5: &str = r#"{
        "grade": "P5",
        "terms": {
            "Term1": {
                "Mathematics": [
                    {"name": "Fractions", "description": "Parts of a whole"},
                    {"oops": true}
                ]
            },
            "Term9": { "Ignored": [] }
        }
    }"#;

    fn library(policy: UnbundledPolicy) -> (TempDir, FallbackLibrary) {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("P5.json"), P5).unwrap();
        fs::write(tmp.path().join("P6.json"), r#"{"grade":"P6","terms":{}}"#).unwrap();
        fs::write(tmp.path().join("notes.txt"), "not a grade").unwrap();
        fs::write(tmp.path().join("Year9.json"), "{}").unwrap();
        let lib = FallbackLibrary::new(tmp.path(), Grade::P5, policy);
        (tmp, lib)
    }

    #[test]
    fn test_bundled_grades_only_counts_grade_files() {
        let (_tmp, lib) = library(UnbundledPolicy::Default);
        assert_eq!(lib.bundled_grades(), vec![Grade::P5, Grade::P6]);
    }

    #[test]
    fn test_bundled_grades_ignore_miscased_file_names() {
        let (tmp, lib) = library(UnbundledPolicy::Default);
        fs::write(tmp.path().join("g7.json"), r#"{"grade":"G7","terms":{}}"#).unwrap();
        fs::write(tmp.path().join("Kg1.json"), r#"{"grade":"KG1","terms":{}}"#).unwrap();

        let grades = lib.bundled_grades();
        assert_eq!(grades, vec![Grade::P5, Grade::P6]);
        assert!(grades.iter().all(|g| lib.is_bundled(*g)));
    }

    #[test]
    fn test_resolve_grade_policies() {
        let (_tmp, lib) = library(UnbundledPolicy::Default);
        assert_eq!(lib.resolve_grade(Grade::P6).unwrap(), Grade::P6);
        assert_eq!(lib.resolve_grade(Grade::G10).unwrap(), Grade::P5);

        let (_tmp, strict) = library(UnbundledPolicy::Reject);
        assert!(matches!(
            strict.resolve_grade(Grade::G10),
            Err(CurriculumError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_builds_annotated_tree() {
        let (_tmp, lib) = library(UnbundledPolicy::Default);
        let content = lib.load(Grade::Kg1).await.unwrap();
        assert_eq!(content.file_name, "P5.json");

        assert_eq!(content.tree.len(), 1, "unknown term is skipped");
        let maths = &content.tree[&Term::Term1]["Mathematics"];
        assert_eq!(maths.len(), 1, "malformed concept is skipped");
        assert_eq!(maths[0].term, Some(Term::Term1));
        assert_eq!(maths[0].subject.as_deref(), Some("Mathematics"));
    }

    #[tokio::test]
    async fn test_missing_default_file_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let lib = FallbackLibrary::new(tmp.path(), Grade::P5, UnbundledPolicy::Default);
        assert!(matches!(
            lib.load(Grade::P5).await,
            Err(CurriculumError::FallbackUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_fallback_file_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("P5.json"), "{ not json").unwrap();
        let lib = FallbackLibrary::new(tmp.path(), Grade::P5, UnbundledPolicy::Default);
        assert!(matches!(
            lib.load(Grade::P5).await,
            Err(CurriculumError::FallbackUnavailable(_))
        ));
    }

    #[test]
    fn test_find_subject_is_case_insensitive() {
        let mut subjects = BTreeMap::new();
        subjects.insert("Mathematics".to_string(), 1);
        assert_eq!(find_subject(&subjects, "mathematics").map(|(_, v)| *v), Some(1));
        assert_eq!(find_subject(&subjects, "Mathematics").map(|(k, _)| k.as_str()), Some("Mathematics"));
        assert!(find_subject(&subjects, "Science").is_none());
    }
}
