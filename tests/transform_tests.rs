//! TSX transform behaviour through the public `SourceTransform` API

use pretty_assertions::assert_eq;

use preview_sandbox::app::preview::{SourceTransform, TransformedModule, TsxTransform};

fn transform(source: &str) -> TransformedModule {
    TsxTransform::new().transform(source).unwrap()
}

#[test]
fn test_generated_component_transforms() {
    let module = transform(
        r#"
import React, { useState, useEffect } from 'react';
import type { ReactNode } from 'react';

type Tab = 'overview' | 'details';

interface CardProps {
  title: string;
  children?: ReactNode;
}

const Card: React.FC<CardProps> = ({ title, children }) => (
  <section className="rounded-lg p-4">
    <h2>{title}</h2>
    {children}
  </section>
);

export default function PreviewComponent(): JSX.Element {
  const [tab, setTab] = useState<Tab>('overview');
  useEffect(() => {
    document.title = tab;
  }, [tab]);
  return (
    <Card title="Dashboard">
      {(['overview', 'details'] as Tab[]).map((t) => (
        <button key={t} onClick={() => setTab(t)} disabled={t === tab}>
          {t}
        </button>
      ))}
    </Card>
  );
}
"#,
    );

    assert_eq!(module.imports, vec!["react".to_string()]);
    assert_eq!(module.exports, vec!["default".to_string()]);
    let code = &module.code;
    assert!(!code.contains("interface"));
    assert!(!code.contains(": string"));
    assert!(!code.contains("<Tab>"));
    assert!(!code.contains(" as Tab[]"));
    assert!(!code.contains("React.FC"));
    assert!(code.contains("React.createElement(\"section\", {\"className\": \"rounded-lg p-4\"}"));
    assert!(code.contains("React.createElement(Card, {\"title\": \"Dashboard\"}"));
    assert!(code.contains("\"key\": t, \"onClick\": () => setTab(t), \"disabled\": t === tab"));
    assert!(code.contains("exports.default = PreviewComponent;"));
}

#[test]
fn test_syntax_error_location_is_one_based() {
    let err = TsxTransform::new()
        .transform("const a = 1;\nconst b = ;\n")
        .unwrap_err();
    let location = err.location.expect("location");
    assert_eq!(location.line, 2);
    assert!(location.column >= 1);
}

#[test]
fn test_incomplete_stream_prefix_fails_cleanly() {
    let source = "export default function PreviewComponent() {\n  return (\n    <div className=\"p-4\">\n      <h1>Hel";
    let err = TsxTransform::new().transform(source).unwrap_err();
    assert!(!err.message.is_empty());
    assert!(err.location.is_some());
}

#[test]
fn test_import_x_equals_require_is_rejected() {
    let err = TsxTransform::new()
        .transform("import fs = require('fs');")
        .unwrap_err();
    assert!(err.message.contains("not supported"), "{}", err);
}

#[test]
fn test_non_module_source_has_no_esmodule_marker() {
    let module = transform("const x = <br />;");
    assert!(!module.code.contains("__esModule"));
    assert!(module.code.contains("React.createElement(\"br\", null)"));
}

#[test]
fn test_optional_chaining_and_generics_in_arrows() {
    let module = transform("const first = <T,>(items?: T[]): T | undefined => items?.[0];");
    assert!(module.code.contains("const first = (items) => items?.[0];"), "{}", module.code);
}
