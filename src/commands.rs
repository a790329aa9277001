//! CLI entry points.
//!
//! Each `run_*` function backs one `curriculum` subcommand: it resolves
//! content through the same [`CurriculumResolver`] the server uses and prints
//! a plain-text summary to stdout. Pass `--json` to any of them for the exact
//! body the HTTP API would return.

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::curriculum::{ConceptQuery, CurriculumResolver};
use crate::grade::{map_user_grade, Term};
use crate::models::{Concept, ContentSource};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn source_label(source: ContentSource, fallback_file: Option<&str>) -> String {
    match (source, fallback_file) {
        (ContentSource::Storage, _) => "storage".to_string(),
        (ContentSource::Fallback, Some(file)) => format!("fallback ({})", file),
        (ContentSource::Fallback, None) => "fallback".to_string(),
    }
}

/// `curriculum grades`
pub async fn run_grades(config: &Config, json: bool) -> Result<()> {
    let resolver = CurriculumResolver::connect(config)?;
    let list = resolver.available_grades().await?;
    if json {
        return print_json(&list);
    }

    println!("bucket: {}  source: {}", resolver.bucket(), source_label(list.source, None));
    if list.grades.is_empty() {
        println!("No grades found.");
    }
    for grade in &list.grades {
        println!("  {}", grade);
    }
    Ok(())
}

/// `curriculum structure <grade>`
pub async fn run_structure(config: &Config, grade: &str, json: bool) -> Result<()> {
    let grade = map_user_grade(grade)?;
    let resolver = CurriculumResolver::connect(config)?;
    let resp = resolver.grade_structure(grade).await?;
    if json {
        return print_json(&resp);
    }

    println!(
        "{}  source: {}",
        resp.structure.grade,
        source_label(resp.source, resp.fallback_file.as_deref())
    );
    for (term, subjects) in &resp.structure.terms {
        println!("  {}", term);
        for subject in subjects {
            println!("    {}", subject);
        }
    }
    Ok(())
}

/// `curriculum concepts <grade> <term> <subject>`
pub async fn run_concepts(
    config: &Config,
    grade: &str,
    term: &str,
    subject: &str,
    json: bool,
) -> Result<()> {
    let grade = map_user_grade(grade)?;
    let term: Term = term.parse()?;
    let resolver = CurriculumResolver::connect(config)?;
    let listing = resolver.subject_concepts(grade, term, subject).await?;
    if json {
        return print_json(&listing);
    }

    println!(
        "{}/{}/{}  source: {}  ({} concepts)",
        listing.grade,
        listing.term,
        listing.subject,
        source_label(listing.source, listing.fallback_file.as_deref()),
        listing.concepts.len()
    );
    for concept in &listing.concepts {
        print_concept_line(concept);
    }
    Ok(())
}

/// `curriculum concept <grade> <term> <subject> <name>`
pub async fn run_concept(
    config: &Config,
    grade: &str,
    term: &str,
    subject: &str,
    name: &str,
    json: bool,
) -> Result<()> {
    let grade = map_user_grade(grade)?;
    let term: Term = term.parse()?;
    let resolver = CurriculumResolver::connect(config)?;
    let resp = resolver.concept(grade, term, subject, name).await?;
    if json {
        return print_json(&resp);
    }

    let c = &resp.concept;
    println!("--- Concept ---");
    println!("name:         {}", c.name);
    println!("grade:        {}", resp.grade);
    println!("term:         {}", term);
    println!("subject:      {}", c.subject.as_deref().unwrap_or(subject));
    println!("source:       {}", source_label(resp.source, resp.fallback_file.as_deref()));
    println!();
    if !c.description.is_empty() {
        println!("{}", c.description);
        println!();
    }
    if !c.examples.is_empty() {
        println!("Examples:");
        for example in &c.examples {
            println!("  - {}", example);
        }
    }
    if !c.sub_concepts.is_empty() {
        println!("Sub-concepts:");
        for sub in &c.sub_concepts {
            println!("  - {}: {}", sub.name, sub.description);
        }
    }
    if !c.exercises.is_empty() {
        println!("Exercises: {}", c.exercises.len());
    }
    Ok(())
}

/// `curriculum search <query> --grade G`
pub async fn run_search(
    config: &Config,
    query: &str,
    grade: &str,
    term: Option<&str>,
    subject: Option<String>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let query = ConceptQuery {
        query: query.to_string(),
        grade: map_user_grade(grade)?,
        term: term.map(str::parse::<Term>).transpose()?,
        subject,
        limit,
    };
    let resolver = CurriculumResolver::connect(config)?;
    let resp = resolver.search(&query).await?;
    if json {
        return print_json(&resp);
    }

    if resp.results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    println!("{} result(s) for \"{}\" in {}", resp.count, resp.query, resp.grade);
    for concept in &resp.results {
        print_concept_line(concept);
    }
    Ok(())
}

/// `curriculum map-grade <value>`
pub fn run_map_grade(value: &str) -> Result<()> {
    let grade = map_user_grade(value)?;
    println!("{}", grade);
    Ok(())
}

fn print_concept_line(concept: &Concept) {
    let location = match (concept.term, concept.subject.as_deref()) {
        (Some(term), Some(subject)) => format!("[{}/{}] ", term, subject),
        _ => String::new(),
    };
    if concept.description.is_empty() {
        println!("  {}{}", location, concept.name);
    } else {
        println!("  {}{}: {}", location, concept.name, truncate(&concept.description, 80));
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
