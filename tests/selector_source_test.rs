// Ordering and fallback behavior of combined selector lists

use pretty_assertions::assert_eq;

mod common;
use common::FakeLlm;

use webassist::{DisabledLlm, FieldType, PageContext, SelectorSource, SelectorTables};

#[tokio::test]
async fn test_llm_selectors_come_first_without_duplicates() {
    let tables = SelectorTables::default();
    let llm = FakeLlm::suggesting(&["#login-email", r#"input[type="email"]"#, "#login-email"]);
    let source = SelectorSource::new(&llm, &tables);

    let combined = source
        .combined_selectors("find the email field", &PageContext::default())
        .await;

    assert_eq!(combined[0], "#login-email");
    assert_eq!(combined[1], r#"input[type="email"]"#);
    assert_eq!(combined[2], "#floating_outlined3");
    assert_eq!(
        combined.iter().filter(|s| *s == r#"input[type="email"]"#).count(),
        1
    );

    let statics = source.static_selectors(FieldType::Email, None);
    assert_eq!(combined.len(), 1 + statics.len());
}

#[tokio::test]
async fn test_same_inputs_give_same_list() {
    let tables = SelectorTables::default();
    let llm = FakeLlm::suggesting(&["#pw"]);
    let source = SelectorSource::new(&llm, &tables);
    let context = PageContext::default();

    let first = source.combined_selectors("type the password", &context).await;
    let second = source.combined_selectors("type the password", &context).await;

    assert_eq!(first, second);
    assert_eq!(first[0], "#pw");
    assert_eq!(first[1], "#floating_outlined15");
}

#[tokio::test]
async fn test_llm_failure_leaves_static_fallbacks() {
    let tables = SelectorTables::default();
    let llm = FakeLlm {
        fail_selectors: true,
        ..Default::default()
    };
    let source = SelectorSource::new(&llm, &tables);

    let combined = source
        .combined_selectors("click the submit button", &PageContext::default())
        .await;

    assert_eq!(combined, source.static_selectors(FieldType::SubmitButton, None));
    assert_eq!(llm.tasks().len(), 1);
}

#[tokio::test]
async fn test_disabled_llm_is_not_called() {
    let tables = SelectorTables::default();
    let source = SelectorSource::new(&DisabledLlm, &tables);

    let dynamic = source
        .dynamic_selectors("find the email field", &PageContext::default())
        .await;
    assert!(dynamic.is_empty());

    // Unknown intent and no LLM: nothing to try
    let combined = source
        .combined_selectors("do a barrel roll", &PageContext::default())
        .await;
    assert!(combined.is_empty());
}

#[tokio::test]
async fn test_llm_selectors_are_sanitized() {
    let tables = SelectorTables::default();
    let llm = FakeLlm::suggesting(&[r#"button:contains("Go")"#, "  "]);
    let source = SelectorSource::new(&llm, &tables);

    let dynamic = source
        .dynamic_selectors("press go", &PageContext::default())
        .await;

    assert_eq!(dynamic, vec![r#"button:has-text("Go")"#.to_string()]);
}

#[tokio::test]
async fn test_targets_fill_templates() {
    let tables = SelectorTables::default();
    let source = SelectorSource::new(&DisabledLlm, &tables);

    let combined = source
        .combined_selectors_for(
            "click Get Started",
            &PageContext::default(),
            Some(FieldType::ClickTarget),
            Some("Get Started"),
        )
        .await;

    assert_eq!(combined[0], r#"button:has-text("Get Started")"#);
    assert!(combined.iter().all(|s| !s.contains("{target}")));
}
