use proptest::prelude::*;
use rstest::rstest;
use xform::consts::XSLT_NS;
use xform::event::{
    ContentChecker, Event, EventRecorder, GuardContext, NamespaceReducer, PipelineBuilder, PipelineConfiguration,
    TreeBuilder, UseWhenFilter,
};
use xform::context::HostLanguage;
use xform::{Error, ErrorCategory, ErrorCode, NodeName};

#[derive(Debug, Clone)]
enum Tree {
    Text(String),
    Element { name: String, guard: Option<bool>, attrs: Vec<(String, String)>, children: Vec<Tree> },
}

fn tree() -> impl Strategy<Value = Tree> {
    let leaf = "[a-z]{0,4}".prop_map(Tree::Text);
    leaf.prop_recursive(4, 32, 4, |inner| {
        (
            "[a-z]{1,3}",
            proptest::option::of(any::<bool>()),
            proptest::collection::vec(("[a-z]{1,2}", "[a-z]{0,3}"), 0..3),
            proptest::collection::vec(inner, 0..4),
        )
            .prop_map(|(name, guard, attrs, children)| Tree::Element { name, guard, attrs, children })
    })
}

fn emit(tree: &Tree, out: &mut Vec<Event>) {
    match tree {
        Tree::Text(t) => out.push(Event::characters(t.clone())),
        Tree::Element { name, guard, attrs, children } => {
            out.push(Event::start_element(NodeName::new("xsl", XSLT_NS, name)));
            let mut seen = Vec::new();
            for (n, v) in attrs {
                if !seen.contains(n) {
                    out.push(Event::attribute(NodeName::local(n), v.clone()));
                    seen.push(n.clone());
                }
            }
            if let Some(g) = guard {
                out.push(Event::attribute(NodeName::local("use-when"), if *g { "true()" } else { "false()" }));
            }
            out.push(Event::StartContent);
            for child in children {
                emit(child, out);
            }
            out.push(Event::EndElement);
        }
    }
}

fn all_text(tree: &Tree) -> String {
    match tree {
        Tree::Text(t) => t.clone(),
        Tree::Element { children, .. } => children.iter().map(all_text).collect(),
    }
}

/// Text surviving a use-when pass: subtrees under a false guard vanish.
fn visible_text(tree: &Tree) -> String {
    match tree {
        Tree::Text(t) => t.clone(),
        Tree::Element { guard: Some(false), .. } => String::new(),
        Tree::Element { children, .. } => children.iter().map(visible_text).collect(),
    }
}

fn guard(expr: &str, _ctx: &GuardContext<'_>) -> Result<bool, Error> {
    Ok(expr == "true()")
}

fn document(tree: &Tree) -> Vec<Event> {
    let mut events = vec![Event::Open, Event::StartDocument { properties: Default::default() }];
    emit(tree, &mut events);
    events.extend([Event::EndDocument, Event::Close]);
    events
}

fn balance(events: &[Event]) -> Result<(), String> {
    let mut depth = 0usize;
    for e in events {
        match e {
            Event::StartElement { .. } => depth += 1,
            Event::EndElement => {
                depth = depth.checked_sub(1).ok_or_else(|| "end_element below depth 0".to_string())?;
            }
            _ => {}
        }
    }
    if depth == 0 { Ok(()) } else { Err(format!("{depth} elements left open")) }
}

proptest! {
    #[test]
    fn checked_pipeline_builds_the_tree_it_was_given(t in tree()) {
        let mut p = PipelineBuilder::new(PipelineConfiguration::default())
            .stage(ContentChecker::new())
            .stage(NamespaceReducer::new())
            .build(TreeBuilder::default());
        p.send_all(document(&t)).unwrap();
        let doc = p.terminal().document().unwrap();
        prop_assert_eq!(doc.string_value(), all_text(&t));
    }

    #[test]
    fn use_when_output_stays_balanced(t in tree()) {
        let mut p = PipelineBuilder::new(PipelineConfiguration::default())
            .stage(UseWhenFilter::new(guard))
            .stage(ContentChecker::new())
            .build(EventRecorder::default());
        p.send_all(document(&t)).unwrap();
        let out = p.terminal_mut().take_events();
        prop_assert!(balance(&out).is_ok(), "{:?}", balance(&out));
        let text: String = out
            .iter()
            .filter_map(|e| match e {
                Event::Characters { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        prop_assert_eq!(text, visible_text(&t));
    }
}

#[rstest]
#[case(HostLanguage::Xslt, ErrorCode::XTDE0410)]
#[case(HostLanguage::XQuery, ErrorCode::XQTY0024)]
fn attribute_after_content_is_reported_per_host(#[case] host: HostLanguage, #[case] code: ErrorCode) {
    let mut p = PipelineBuilder::new(PipelineConfiguration::default().with_host_language(host))
        .stage(ContentChecker::new())
        .build(TreeBuilder::default());
    let err = p
        .send_all([
            Event::start_element(NodeName::local("out")),
            Event::StartContent,
            Event::characters("x"),
            Event::attribute(NodeName::local("late"), "1"),
        ])
        .unwrap_err();
    assert_eq!(err.code_enum(), code);
    assert_eq!(err.category(), ErrorCategory::StructuralPipeline);
}

#[rstest]
fn tree_builder_alone_rejects_misnested_events() {
    let mut p = PipelineBuilder::new(PipelineConfiguration::default()).build(TreeBuilder::default());
    let err = p.send_all([Event::start_element(NodeName::local("a")), Event::characters("x")]).unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::PIPE0001);
}
