//! Curriculum resolution: storage first, bundled files second.
//!
//! [`CurriculumResolver`] turns (grade, term, subject, concept) requests into
//! bucket keys, fetches and parses the JSON found there, and degrades to the
//! [`FallbackLibrary`] whenever the bucket cannot answer.
//!
//! # Key Layout
//!
//! ```text
//! {root}/{grade}/                                         grade prefix
//! {root}/{grade}/{term}/                                  term prefix
//! {root}/{grade}/{term}/{subject}/concepts/unified_curriculum.json
//! ```
//!
//! `{root}` is `storage.root_prefix` (default `concepts/content`).
//!
//! # Degradation
//!
//! | Storage outcome | Result |
//! |-----------------|--------|
//! | object fetched and parsed | `source: "storage"` |
//! | network / auth / missing key / malformed JSON | fallback file for the grade |
//! | fallback has no such term/subject | [`CurriculumError::NotFound`] |
//! | fallback file missing | [`CurriculumError::FallbackUnavailable`] |
//!
//! Malformed individual concepts are skipped with a warning in both paths.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::CurriculumError;
use crate::fallback::{find_subject, FallbackLibrary};
use crate::grade::{map_user_grade, Grade, Term};
use crate::models::{
    parse_concepts, Concept, ConceptFile, ConceptResponse, ContentSource, GradeCurriculum,
    GradeList, GradeStructure, SearchResponse, StructureResponse, SubjectConcepts,
};
use crate::search::{search_concepts, SearchOptions};
use crate::storage::gcs::GcsStore;
use crate::storage::{prefix_leaf, ObjectStore, StorageError};

/// Directory under each subject holding generated concept files.
pub const CONCEPTS_DIR: &str = "concepts";
pub const CONCEPT_FILE_NAME: &str = "unified_curriculum.json";

/// Scope and text of a concept search.
#[derive(Debug, Clone)]
pub struct ConceptQuery {
    pub query: String,
    pub grade: Grade,
    pub term: Option<Term>,
    pub subject: Option<String>,
    pub limit: Option<usize>,
}

pub struct CurriculumResolver {
    store: Arc<dyn ObjectStore>,
    fallback: FallbackLibrary,
    root_prefix: String,
    case_sensitive: bool,
}

impl CurriculumResolver {
    pub fn new(store: Arc<dyn ObjectStore>, fallback: FallbackLibrary, root_prefix: &str) -> Self {
        Self {
            store,
            fallback,
            root_prefix: root_prefix.trim_matches('/').to_string(),
            case_sensitive: false,
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn ObjectStore>) -> Self {
        Self::new(
            store,
            FallbackLibrary::from_config(&config.fallback),
            &config.storage.root_prefix,
        )
        .with_case_sensitive_search(config.search.case_sensitive)
    }

    /// Resolver backed by the configured GCS bucket.
    pub fn connect(config: &Config) -> anyhow::Result<Self> {
        let store = GcsStore::from_config(&config.storage)?;
        Ok(Self::from_config(config, Arc::new(store)))
    }

    pub fn with_case_sensitive_search(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn fallback(&self) -> &FallbackLibrary {
        &self.fallback
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    // ============ Key layout ============

    fn root(&self) -> String {
        if self.root_prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.root_prefix)
        }
    }

    pub fn grade_prefix(&self, grade: Grade) -> String {
        format!("{}{}/", self.root(), grade.code())
    }

    pub fn term_prefix(&self, grade: Grade, term: Term) -> String {
        format!("{}{}/", self.grade_prefix(grade), term.code())
    }

    pub fn concept_file_key(&self, grade: Grade, term: Term, subject: &str) -> String {
        format!(
            "{}{}/{}/{}",
            self.term_prefix(grade, term),
            subject,
            CONCEPTS_DIR,
            CONCEPT_FILE_NAME
        )
    }

    // ============ Grades ============

    /// Grades present in the bucket, or the bundled grades when the bucket
    /// cannot be listed.
    pub async fn available_grades(&self) -> Result<GradeList, CurriculumError> {
        match self.store.list_prefixes(&self.root()).await {
            Ok(prefixes) => {
                let mut grades: Vec<Grade> = prefixes
                    .iter()
                    .filter_map(|p| prefix_leaf(p))
                    .filter_map(Grade::from_code)
                    .collect();
                grades.sort();
                grades.dedup();
                Ok(GradeList {
                    grades,
                    source: ContentSource::Storage,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "grade listing failed, using bundled grades");
                let grades = self.fallback.bundled_grades();
                if grades.is_empty() {
                    return Err(CurriculumError::FallbackUnavailable(format!(
                        "no fallback files in {}",
                        self.fallback.dir().display()
                    )));
                }
                Ok(GradeList {
                    grades,
                    source: ContentSource::Fallback,
                })
            }
        }
    }

    // ============ Structure ============

    async fn storage_structure(&self, grade: Grade) -> Result<GradeStructure, StorageError> {
        let term_prefixes = self.store.list_prefixes(&self.grade_prefix(grade)).await?;
        let mut terms: BTreeMap<Term, Vec<String>> = BTreeMap::new();

        for term_prefix in &term_prefixes {
            let Some(leaf) = prefix_leaf(term_prefix) else {
                continue;
            };
            if !leaf.starts_with("Term") {
                continue;
            }
            let term = match leaf.parse::<Term>() {
                Ok(term) => term,
                Err(e) => {
                    tracing::warn!(grade = %grade, error = %e, "skipping unrecognised term prefix");
                    continue;
                }
            };

            let mut subjects: Vec<String> = self
                .store
                .list_prefixes(term_prefix)
                .await?
                .iter()
                .filter_map(|p| prefix_leaf(p))
                .filter(|s| *s != CONCEPTS_DIR)
                .map(str::to_string)
                .collect();
            subjects.sort();
            subjects.dedup();
            terms.entry(term).or_default().extend(subjects);
        }

        Ok(GradeStructure { grade, terms })
    }

    /// Term/subject layout of a grade.
    pub async fn grade_structure(&self, grade: Grade) -> Result<StructureResponse, CurriculumError> {
        match self.storage_structure(grade).await {
            Ok(structure) if !structure.terms.is_empty() => {
                return Ok(StructureResponse {
                    structure,
                    source: ContentSource::Storage,
                    fallback_file: None,
                });
            }
            Ok(_) => tracing::info!(grade = %grade, "grade has no terms in storage, using fallback"),
            Err(e) => tracing::warn!(grade = %grade, error = %e, "structure listing failed, using fallback"),
        }

        let content = self.fallback.load(grade).await?;
        Ok(StructureResponse {
            structure: GradeStructure::from_tree(grade, &content.tree),
            source: ContentSource::Fallback,
            fallback_file: Some(content.file_name),
        })
    }

    // ============ Curriculum ============

    /// Curriculum for a whole grade.
    ///
    /// From storage this is the structure only; concepts are fetched per
    /// subject. From the fallback path the full content tree is included.
    pub async fn grade_curriculum(&self, grade: Grade) -> Result<GradeCurriculum, CurriculumError> {
        match self.storage_structure(grade).await {
            Ok(structure) if !structure.terms.is_empty() => {
                return Ok(GradeCurriculum {
                    grade,
                    source: ContentSource::Storage,
                    structure,
                    fallback_file: None,
                    content: None,
                });
            }
            Ok(_) => tracing::info!(grade = %grade, "grade has no terms in storage, using fallback"),
            Err(e) => tracing::warn!(grade = %grade, error = %e, "curriculum listing failed, using fallback"),
        }

        let content = self.fallback.load(grade).await?;
        Ok(GradeCurriculum {
            grade,
            source: ContentSource::Fallback,
            structure: GradeStructure::from_tree(grade, &content.tree),
            fallback_file: Some(content.file_name),
            content: Some(content.tree),
        })
    }

    /// Curriculum for a caller identified by an informal grade (`"5"`).
    pub async fn user_curriculum(&self, user_grade: &str) -> Result<GradeCurriculum, CurriculumError> {
        let grade = map_user_grade(user_grade)?;
        self.grade_curriculum(grade).await
    }

    // ============ Concepts ============

    async fn fetch_concepts(&self, key: &str) -> Result<Vec<Concept>, StorageError> {
        let bytes = self.store.get_object(key).await?;
        let file: ConceptFile = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Decode(format!("malformed JSON in {}: {}", key, e)))?;
        Ok(parse_concepts(file.concepts, key))
    }

    /// Concepts for one subject.
    pub async fn subject_concepts(
        &self,
        grade: Grade,
        term: Term,
        subject: &str,
    ) -> Result<SubjectConcepts, CurriculumError> {
        let subject = validate_subject(subject)?;
        let key = self.concept_file_key(grade, term, subject);

        match self.fetch_concepts(&key).await {
            Ok(concepts) => {
                return Ok(SubjectConcepts {
                    grade,
                    term,
                    subject: subject.to_string(),
                    source: ContentSource::Storage,
                    fallback_file: None,
                    concepts: annotate(concepts, term, subject),
                });
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(key = %key, "concept file not in storage, using fallback")
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "concept fetch failed, using fallback"),
        }

        let content = self.fallback.load(grade).await?;
        let found = content
            .tree
            .get(&term)
            .and_then(|subjects| find_subject(subjects, subject));

        match found {
            Some((name, concepts)) => Ok(SubjectConcepts {
                grade,
                term,
                subject: name.clone(),
                source: ContentSource::Fallback,
                fallback_file: Some(content.file_name.clone()),
                concepts: concepts.clone(),
            }),
            None => Err(CurriculumError::not_found(format!(
                "no concepts for {}/{}/{} in storage or fallback ({})",
                grade, term, subject, content.file_name
            ))),
        }
    }

    /// A single concept, matched on name without regard to case.
    pub async fn concept(
        &self,
        grade: Grade,
        term: Term,
        subject: &str,
        name: &str,
    ) -> Result<ConceptResponse, CurriculumError> {
        let listing = self.subject_concepts(grade, term, subject).await?;
        let wanted = name.trim().to_lowercase();
        let SubjectConcepts {
            source,
            fallback_file,
            concepts,
            ..
        } = listing;
        concepts
            .into_iter()
            .find(|c| c.name.trim().to_lowercase() == wanted)
            .map(|concept| ConceptResponse {
                grade,
                source,
                fallback_file,
                concept,
            })
            .ok_or_else(|| {
                CurriculumError::not_found(format!(
                    "concept '{}' not found in {}/{}/{}",
                    name.trim(),
                    grade,
                    term,
                    subject
                ))
            })
    }

    // ============ Search ============

    /// Substring search over every concept in the query's scope.
    ///
    /// Without a term and subject the scope is expanded through
    /// [`grade_structure`](Self::grade_structure). Subjects that turn out to
    /// have no content are skipped.
    pub async fn search(&self, query: &ConceptQuery) -> Result<SearchResponse, CurriculumError> {
        if query.query.trim().is_empty() {
            return Err(CurriculumError::EmptyQuery);
        }

        let scope: Vec<(Term, String)> = match (query.term, query.subject.as_deref()) {
            (Some(term), Some(subject)) => vec![(term, validate_subject(subject)?.to_string())],
            (term_filter, subject_filter) => {
                let wanted_subject = subject_filter.map(str::to_lowercase);
                let structure = self.grade_structure(query.grade).await?.structure;
                structure
                    .terms
                    .into_iter()
                    .filter(|(term, _)| term_filter.map_or(true, |t| t == *term))
                    .flat_map(|(term, subjects)| subjects.into_iter().map(move |s| (term, s)))
                    .filter(|(_, subject)| {
                        wanted_subject
                            .as_ref()
                            .map_or(true, |w| subject.to_lowercase() == *w)
                    })
                    .collect()
            }
        };

        let mut pool = Vec::new();
        let mut fallback_files: Vec<String> = Vec::new();
        for (term, subject) in &scope {
            match self.subject_concepts(query.grade, *term, subject).await {
                Ok(listing) => {
                    if let Some(file) = listing.fallback_file {
                        if !fallback_files.contains(&file) {
                            fallback_files.push(file);
                        }
                    }
                    pool.extend(listing.concepts);
                }
                Err(CurriculumError::NotFound(msg)) => {
                    tracing::debug!(grade = %query.grade, term = %term, subject = %subject, reason = %msg, "subject skipped in search")
                }
                Err(e) => return Err(e),
            }
        }

        let options = SearchOptions {
            case_sensitive: self.case_sensitive,
            limit: query.limit,
        };
        let results: Vec<Concept> = search_concepts(&query.query, &pool, options)
            .into_iter()
            .cloned()
            .collect();

        tracing::debug!(
            grade = %query.grade,
            subjects = scope.len(),
            searched = pool.len(),
            matched = results.len(),
            "concept search"
        );

        Ok(SearchResponse {
            query: query.query.clone(),
            grade: query.grade,
            count: results.len(),
            fallback_files,
            results,
        })
    }
}

fn annotate(mut concepts: Vec<Concept>, term: Term, subject: &str) -> Vec<Concept> {
    for concept in &mut concepts {
        concept.term = Some(term);
        concept.subject = Some(subject.to_string());
    }
    concepts
}

/// Subjects become a single key segment, so they must not carry separators
/// or relative components.
pub fn validate_subject(subject: &str) -> Result<&str, CurriculumError> {
    let trimmed = subject.trim();
    let invalid = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.chars().any(char::is_control);
    if invalid {
        return Err(CurriculumError::InvalidSubject(subject.to_string()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnbundledPolicy;
    use crate::storage::memory::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    const ROOT: &str = "concepts/content";

    fn fallback_dir() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("P5.json"),
            r#"{"grade":"P5","terms":{"Term1":{"Mathematics":[{"name":"Fallback Fractions","description":"From P5 file"}]}}}"#,
        )
        .unwrap();
        tmp
    }

    fn resolver(store: MemoryStore, dir: &TempDir) -> CurriculumResolver {
        let fallback = FallbackLibrary::new(dir.path(), Grade::P5, UnbundledPolicy::Default);
        CurriculumResolver::new(Arc::new(store), fallback, ROOT)
    }

    fn key(grade: &str, term: &str, subject: &str) -> String {
        format!("{ROOT}/{grade}/{term}/{subject}/concepts/unified_curriculum.json")
    }

    #[test]
    fn test_key_layout() {
        let dir = fallback_dir();
        let r = resolver(MemoryStore::new("b"), &dir);
        assert_eq!(r.grade_prefix(Grade::G10), "concepts/content/G10/");
        assert_eq!(r.term_prefix(Grade::P5, Term::Term2), "concepts/content/P5/Term2/");
        assert_eq!(
            r.concept_file_key(Grade::P5, Term::Term1, "Mathematics"),
            key("P5", "Term1", "Mathematics")
        );
    }

    #[test]
    fn test_validate_subject() {
        assert_eq!(validate_subject(" Mathematics ").unwrap(), "Mathematics");
        assert_eq!(validate_subject("Social Studies").unwrap(), "Social Studies");
        for bad in ["", "  ", ".", "..", "a/b", "a\\b", "x\ny"] {
            assert!(validate_subject(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[tokio::test]
    async fn test_grades_sorted_and_filtered() {
        let dir = fallback_dir();
        let store = MemoryStore::new("b")
            .with_object(key("G10", "Term1", "Physics"), "{}")
            .with_object(key("P5", "Term1", "Mathematics"), "{}")
            .with_object(key("KG1", "Term1", "Art"), "{}")
            .with_object(format!("{ROOT}/drafts/readme.md"), "x");
        let list = resolver(store, &dir).available_grades().await.unwrap();
        assert_eq!(list.grades, vec![Grade::Kg1, Grade::P5, Grade::G10]);
        assert_eq!(list.source, ContentSource::Storage);
    }

    #[tokio::test]
    async fn test_structure_skips_concepts_dir_and_non_terms() {
        let dir = fallback_dir();
        let store = MemoryStore::new("b")
            .with_object(key("P5", "Term1", "Mathematics"), "{}")
            .with_object(key("P5", "Term1", "Science"), "{}")
            .with_object(key("P5", "Term2", "English"), "{}")
            .with_object(format!("{ROOT}/P5/Term1/concepts/index.json"), "{}")
            .with_object(format!("{ROOT}/P5/assets/logo.png"), "png");
        let resp = resolver(store, &dir).grade_structure(Grade::P5).await.unwrap();
        assert_eq!(resp.source, ContentSource::Storage);
        assert_eq!(
            resp.structure.terms[&Term::Term1],
            vec!["Mathematics".to_string(), "Science".to_string()]
        );
        assert_eq!(resp.structure.terms[&Term::Term2], vec!["English".to_string()]);
        assert_eq!(resp.structure.terms.len(), 2);
    }

    #[tokio::test]
    async fn test_subject_concepts_from_storage_are_annotated() {
        let dir = fallback_dir();
        let store = MemoryStore::new("b").with_object(
            key("P6", "Term2", "Science"),
            r#"{"concepts":[{"name":"Magnets","description":"Attract iron"},{"bad":1},{"name":"Circuits"}]}"#,
        );
        let listing = resolver(store, &dir)
            .subject_concepts(Grade::P6, Term::Term2, "Science")
            .await
            .unwrap();
        assert_eq!(listing.source, ContentSource::Storage);
        assert_eq!(listing.fallback_file, None);
        let names: Vec<&str> = listing.concepts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Magnets", "Circuits"]);
        assert!(listing
            .concepts
            .iter()
            .all(|c| c.term == Some(Term::Term2) && c.subject.as_deref() == Some("Science")));
    }

    #[tokio::test]
    async fn test_malformed_file_falls_back() {
        let dir = fallback_dir();
        let store = MemoryStore::new("b").with_object(key("P5", "Term1", "Mathematics"), "{ nope");
        let listing = resolver(store, &dir)
            .subject_concepts(Grade::P5, Term::Term1, "Mathematics")
            .await
            .unwrap();
        assert_eq!(listing.source, ContentSource::Fallback);
        assert_eq!(listing.subject, "Mathematics");
        assert_eq!(listing.concepts[0].name, "Fallback Fractions");
    }

    #[tokio::test]
    async fn test_fallback_subject_lookup_ignores_case() {
        let dir = fallback_dir();
        let listing = resolver(MemoryStore::new("b"), &dir)
            .subject_concepts(Grade::P5, Term::Term1, "mathematics")
            .await
            .unwrap();
        assert_eq!(listing.source, ContentSource::Fallback);
        assert_eq!(listing.subject, "Mathematics");
    }

    #[tokio::test]
    async fn test_missing_everywhere_is_not_found() {
        let dir = fallback_dir();
        let err = resolver(MemoryStore::new("b"), &dir)
            .subject_concepts(Grade::G8, Term::Term2, "History")
            .await
            .unwrap_err();
        assert!(matches!(err, CurriculumError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concept_lookup_is_case_insensitive() {
        let dir = fallback_dir();
        let store = MemoryStore::new("b").with_object(
            key("P5", "Term1", "Mathematics"),
            r#"{"concepts":[{"name":"Long Division"}]}"#,
        );
        let r = resolver(store, &dir);
        let found = r
            .concept(Grade::P5, Term::Term1, "Mathematics", "long division")
            .await
            .unwrap();
        assert_eq!(found.concept.name, "Long Division");

        let missing = r
            .concept(Grade::P5, Term::Term1, "Mathematics", "Algebra")
            .await
            .unwrap_err();
        assert!(matches!(missing, CurriculumError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unavailable_storage_serves_fallback_curriculum() {
        let dir = fallback_dir();
        let r = resolver(MemoryStore::unavailable("b"), &dir);

        let curriculum = r.user_curriculum("9").await.unwrap();
        assert_eq!(curriculum.grade, Grade::G9);
        assert_eq!(curriculum.source, ContentSource::Fallback);
        assert_eq!(curriculum.fallback_file.as_deref(), Some("P5.json"));
        assert!(curriculum.content.is_some());

        let grades = r.available_grades().await.unwrap();
        assert_eq!(grades.grades, vec![Grade::P5]);
        assert_eq!(grades.source, ContentSource::Fallback);
    }

    #[tokio::test]
    async fn test_substituted_fallback_names_its_file() {
        let dir = fallback_dir();
        let r = resolver(MemoryStore::unavailable("b"), &dir);

        let listing = r
            .subject_concepts(Grade::G10, Term::Term1, "Mathematics")
            .await
            .unwrap();
        assert_eq!(listing.grade, Grade::G10);
        assert_eq!(listing.source, ContentSource::Fallback);
        assert_eq!(listing.fallback_file.as_deref(), Some("P5.json"));

        let found = r
            .concept(Grade::G10, Term::Term1, "Mathematics", "fallback fractions")
            .await
            .unwrap();
        assert_eq!(found.fallback_file.as_deref(), Some("P5.json"));

        let query = ConceptQuery {
            query: "fractions".to_string(),
            grade: Grade::G10,
            term: None,
            subject: None,
            limit: None,
        };
        let resp = r.search(&query).await.unwrap();
        assert_eq!(resp.count, 1);
        assert_eq!(resp.fallback_files, vec!["P5.json".to_string()]);
    }

    #[tokio::test]
    async fn test_user_curriculum_rejects_unknown_grade() {
        let dir = fallback_dir();
        let err = resolver(MemoryStore::new("b"), &dir)
            .user_curriculum("13")
            .await
            .unwrap_err();
        assert!(matches!(err, CurriculumError::UnknownGrade(_)));
    }

    #[tokio::test]
    async fn test_search_across_grade() {
        let dir = fallback_dir();
        let store = MemoryStore::new("b")
            .with_object(
                key("P5", "Term1", "Mathematics"),
                r#"{"concepts":[{"name":"Fractions","description":"Parts of a whole"},{"name":"Angles"}]}"#,
            )
            .with_object(
                key("P5", "Term2", "Science"),
                r#"{"concepts":[{"name":"Food chains","description":"Who eats whom, as a whole system"}]}"#,
            );
        let r = resolver(store, &dir);

        let query = ConceptQuery {
            query: "WHOLE".to_string(),
            grade: Grade::P5,
            term: None,
            subject: None,
            limit: None,
        };
        let resp = r.search(&query).await.unwrap();
        let names: Vec<&str> = resp.results.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Fractions", "Food chains"]);
        assert_eq!(resp.count, 2);
        assert!(resp.fallback_files.is_empty());

        let scoped = ConceptQuery {
            term: Some(Term::Term2),
            ..query.clone()
        };
        assert_eq!(r.search(&scoped).await.unwrap().count, 1);

        let none = ConceptQuery {
            query: "volcano".to_string(),
            ..query.clone()
        };
        assert_eq!(r.search(&none).await.unwrap().count, 0);

        let blank = ConceptQuery {
            query: " ".to_string(),
            ..query
        };
        assert!(matches!(r.search(&blank).await, Err(CurriculumError::EmptyQuery)));
    }
}
