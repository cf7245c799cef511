//! End-to-end conversion tests.
//!
//! Tests that need a real pandoc binary return early when none is on PATH.

use std::path::{Path, PathBuf};

use pandoc_mcp::config::PandocConfig;
use pandoc_mcp::error::{ConvertError, DefaultsFileError};
use pandoc_mcp::pandoc::defaults::{defaults_dir, read_defaults};
use pandoc_mcp::pandoc::{
    ConversionHandler, ConversionOutcome, ConversionRequest, FilterResolver, PandocEngine,
};

// =============================================================================
// Helpers
// =============================================================================

const MISSING_ENGINE: &str = "/nonexistent/dir/pandoc-does-not-exist";

fn handler(program: &str, cwd: &Path) -> ConversionHandler {
    ConversionHandler::with_parts(
        PandocEngine::new(program),
        FilterResolver::new(cwd.to_path_buf(), cwd.join("no-user-filters")),
        &PandocConfig::default(),
    )
}

/// Returns a handler backed by the real pandoc, or `None` if unavailable.
async fn real_handler(cwd: &Path) -> Option<ConversionHandler> {
    let handler = handler("pandoc", cwd);
    handler.engine().is_available().await.then_some(handler)
}

fn inline(contents: &str, from: &str, to: &str) -> ConversionRequest {
    ConversionRequest {
        contents: Some(contents.to_string()),
        input_format: from.to_string(),
        output_format: to.to_string(),
        ..ConversionRequest::default()
    }
}

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

// =============================================================================
// Validation Ordering Tests
// =============================================================================

#[tokio::test]
async fn test_validation_precedes_engine_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let handler = handler(MISSING_ENGINE, dir.path());

    for format in ["docx", "odt", "rtf", "epub", "pdf"] {
        let err = handler
            .handle(&inline("# Title", "markdown", format))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error", "{format}: {err}");
        assert!(err.to_string().contains(format));
    }
}

#[tokio::test]
async fn test_text_formats_reach_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let handler = handler(MISSING_ENGINE, dir.path());

    for format in ["markdown", "html", "txt", "text", "rst", "latex", "ipynb"] {
        let err = handler
            .handle(&inline("# Title", "markdown", format))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ConvertError::EngineNotFound { .. }),
            "{format}: {err:?}"
        );
    }
}

#[tokio::test]
async fn test_defaults_checked_before_filters() {
    let dir = tempfile::tempdir().unwrap();
    let defaults = write(dir.path(), "broken.yaml", "- just\n- a list\n");

    let request = ConversionRequest {
        defaults_file: Some(defaults),
        filters: vec!["missing.lua".to_string()],
        ..inline("x", "markdown", "html")
    };
    let err = handler(MISSING_ENGINE, dir.path())
        .handle(&request)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            ConvertError::DefaultsFile(DefaultsFileError::NotAMapping { .. })
        ),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_missing_defaults_file() {
    let dir = tempfile::tempdir().unwrap();
    let request = ConversionRequest {
        defaults_file: Some(dir.path().join("nope.yaml")),
        ..inline("x", "markdown", "html")
    };
    let err = handler(MISSING_ENGINE, dir.path())
        .handle(&request)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "defaults_file_error");
    assert!(err.to_string().contains("nope.yaml"));
}

// =============================================================================
// Defaults File Tests
// =============================================================================

#[test]
fn test_read_defaults_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "defaults.yaml",
        "to: html\nstandalone: true\nfilters:\n  - wc.lua\n",
    );

    let mapping = tokio_test::block_on(read_defaults(&path)).unwrap();
    assert_eq!(mapping.len(), 3);
    assert_eq!(
        tokio_test::block_on(defaults_dir(&path)),
        Some(dir.path().canonicalize().unwrap())
    );
}

#[test]
fn test_read_defaults_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "empty.yaml", "\n  \n");

    let err = tokio_test::block_on(read_defaults(&path)).unwrap_err();
    assert!(matches!(err, DefaultsFileError::Empty { .. }), "{err:?}");
}

// =============================================================================
// Real Engine Tests
// =============================================================================

#[tokio::test]
async fn test_markdown_to_html_inline() {
    let dir = tempfile::tempdir().unwrap();
    let Some(handler) = real_handler(dir.path()).await else {
        return;
    };

    let outcome = handler
        .handle(&inline(
            "# Hello World\n\nThis is **bold** text.",
            "markdown",
            "html",
        ))
        .await
        .unwrap();
    let ConversionOutcome::Text(html) = outcome else {
        panic!("expected inline text");
    };
    assert!(html.contains("Hello World"));
    assert!(html.contains("<strong>bold</strong>"));
}

#[tokio::test]
async fn test_legacy_text_alias_yields_plain_text() {
    let dir = tempfile::tempdir().unwrap();
    let Some(handler) = real_handler(dir.path()).await else {
        return;
    };

    let outcome = handler
        .handle(&inline("Some *emphasis* here.", "markdown", "text"))
        .await
        .unwrap();
    let text = outcome.message();
    assert!(text.contains("emphasis"));
    assert!(!text.contains("<em>"));
}

#[tokio::test]
async fn test_file_to_file_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let Some(handler) = real_handler(dir.path()).await else {
        return;
    };

    let input = write(dir.path(), "in.html", "<h2>Section</h2><p>Body</p>");
    let output = dir.path().join("out").join("result.md");
    let request = ConversionRequest {
        input_file: Some(input.clone()),
        output_file: Some(output.clone()),
        input_format: "html".to_string(),
        output_format: "markdown".to_string(),
        ..ConversionRequest::default()
    };

    let outcome = handler.handle(&request).await.unwrap();
    assert_eq!(
        outcome,
        ConversionOutcome::Written {
            input: Some(input),
            output: output.clone(),
        }
    );

    let markdown = std::fs::read_to_string(&output).unwrap();
    assert!(markdown.contains("Section"));
    assert!(markdown.contains("Body"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_filter_next_to_defaults_file() {
    let dir = tempfile::tempdir().unwrap();
    let Some(handler) = real_handler(dir.path()).await else {
        return;
    };

    // Identity JSON filter, written without execute permission.
    let config_dir = tempfile::tempdir().unwrap();
    let defaults = write(config_dir.path(), "defaults.yaml", "standalone: false\n");
    write(config_dir.path(), "identity.sh", "#!/bin/sh\ncat\n");

    let request = ConversionRequest {
        defaults_file: Some(defaults),
        filters: vec!["identity.sh".to_string()],
        ..inline("quiet words", "markdown", "html")
    };
    let outcome = handler.handle(&request).await.unwrap();
    assert!(outcome.message().contains("quiet words"));
}

#[tokio::test]
async fn test_identity_conversion_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let Some(handler) = real_handler(dir.path()).await else {
        return;
    };

    for contents in ["", "Just a paragraph.\n"] {
        let outcome = handler
            .handle(&inline(contents, "markdown", "markdown"))
            .await
            .unwrap();
        assert!(matches!(outcome, ConversionOutcome::Text(_)));
    }
}
