use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::*;

// ============================================================================
//  FIXTURES
// ============================================================================

struct TestScope {
    id: ScopeId,
    bodies: HashMap<String, Body>,
    links: HashMap<(String, String), Link>,
}

impl TestScope {
    fn new(id: u64) -> Self {
        Self { id: ScopeId(id), bodies: HashMap::new(), links: HashMap::new() }
    }

    fn add_body(&mut self, name: &str, links: &[&str]) -> Body {
        let object: Arc<dyn Any + Send + Sync> = Arc::new(name.to_string());
        let body = Body::new(self.id, name, object);
        for link in links {
            let object: Arc<dyn Any + Send + Sync> = Arc::new(format!("{}/{}", name, link));
            let handle = Link::new(body.clone(), link, object);
            self.links.insert((name.to_string(), link.to_string()), handle);
        }
        self.bodies.insert(name.to_string(), body.clone());
        body
    }
}

impl Scope for TestScope {
    fn id(&self) -> ScopeId {
        self.id
    }

    fn lookup_body(&self, name: &str) -> Option<Body> {
        self.bodies.get(name).cloned()
    }

    fn lookup_link(&self, body: &Body, name: &str) -> Option<Link> {
        self.links.get(&(body.name().to_string(), name.to_string())).cloned()
    }
}

#[derive(Default)]
struct TestResolver {
    scopes: HashMap<ScopeId, Arc<dyn Scope>>,
}

impl TestResolver {
    fn with(scope: TestScope) -> Self {
        let mut resolver = Self::default();
        resolver.scopes.insert(scope.id, Arc::new(scope));
        resolver
    }
}

impl Resolver for TestResolver {
    fn lookup_scope(&self, id: ScopeId) -> Option<Arc<dyn Scope>> {
        self.scopes.get(&id).cloned()
    }
}

/// Encodes, writes to text, parses back and decodes.
fn through_text(registry: &Registry, value: &Value, resolver: &dyn Resolver) -> Result<Value> {
    let text = tagpack::to_text(&registry.encode(value)?);
    let node = tagpack::from_text(&text).expect("writer output must parse");
    registry.decode(&node, resolver)
}

// ============================================================================
//  PLAIN DATA
// ============================================================================

#[test]
fn test_plain_data_needs_no_registration() -> Result<()> {
    let registry = Registry::new();
    let value = Value::Map(vec![
        ("name".into(), "test_box".into()),
        ("count".into(), 3.into()),
        ("scale".into(), 0.25.into()),
        ("tags".into(), Value::List(vec![true.into(), Value::Null])),
    ]);

    assert_eq!(through_text(&registry, &value, &NoResolver)?, value);
    Ok(())
}

#[test]
fn test_plain_data_is_untagged_on_the_wire() -> Result<()> {
    let registry = Registry::with_builtins();
    let node = registry.encode(&Value::List(vec![1.into(), "a".into()]))?;
    assert_eq!(tagpack::to_text(&node), r#"[1, "a"]"#);
    Ok(())
}

// ============================================================================
//  ARRAYS
// ============================================================================

#[test]
fn test_array_rank_one() -> Result<()> {
    let registry = Registry::with_builtins();
    let array = Array::from_vec(vec![1.0, -2.5, 3.0]);

    let node = registry.encode(&array.clone().into())?;
    assert_eq!(tagpack::to_text(&node), "!ndarray [1.0, -2.5, 3.0]");

    let back = through_text(&registry, &array.clone().into(), &NoResolver)?;
    assert_eq!(back.downcast_ref::<Array>(), Some(&array));
    Ok(())
}

#[test]
fn test_array_rank_two_keeps_shape() -> Result<()> {
    let registry = Registry::with_builtins();
    let array = Array::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).expect("rectangular");

    let back = through_text(&registry, &array.clone().into(), &NoResolver)?;
    let back = back.downcast_ref::<Array>().expect("array");
    assert_eq!(back.shape(), [2, 3]);
    assert_eq!(back.get(&[1, 2]), Some(6.0));
    assert_eq!(back, &array);
    Ok(())
}

#[test]
fn test_array_accepts_integer_leaves() -> Result<()> {
    let registry = Registry::with_builtins();
    let node = tagpack::from_text("!ndarray [[1, 2], [3, 4.5]]").expect("parses");

    let value = registry.decode(&node, &NoResolver)?;
    let array = value.downcast_ref::<Array>().expect("array");
    assert_eq!(array.data(), [1.0, 2.0, 3.0, 4.5]);
    Ok(())
}

#[test]
fn test_array_random_round_trip() -> Result<()> {
    let registry = Registry::with_builtins();
    let mut rng = StdRng::seed_from_u64(0x7a6);

    for _ in 0..50 {
        let rank = rng.gen_range(1..=3);
        let shape: Vec<usize> = (0..rank).map(|_| rng.gen_range(1..=5)).collect();
        let len = shape.iter().product::<usize>();
        let data: Vec<f64> = (0..len).map(|_| rng.gen_range(-1e6..1e6)).collect();
        let array = Array::new(shape, data).expect("consistent shape");

        let back = through_text(&registry, &array.clone().into(), &NoResolver)?;
        assert_eq!(back.downcast_ref::<Array>(), Some(&array));
    }
    Ok(())
}

#[test]
fn test_array_ragged_is_malformed() {
    let registry = Registry::with_builtins();
    let node = tagpack::from_text("!ndarray [[1, 2], [3]]").expect("parses");

    match registry.decode(&node, &NoResolver) {
        Err(Error::Malformed { tag, .. }) => assert_eq!(tag, tags::ARRAY),
        res => panic!("Expected Malformed, got {:?}", res),
    }
}

#[test]
fn test_array_non_number_is_malformed() {
    let registry = Registry::with_builtins();
    let node = tagpack::from_text(r#"!ndarray [1, "two"]"#).expect("parses");

    match registry.decode(&node, &NoResolver) {
        Err(Error::Malformed { tag, reason }) => {
            assert_eq!(tag, tags::ARRAY);
            assert_eq!(reason, "expected a number");
        }
        res => panic!("Expected Malformed, got {:?}", res),
    }
}

/// A sequence whose first element nests `depth` levels further and whose other
/// 99 elements are plain zeros, so the first elements claim a `[100; depth]` shape.
fn lopsided_array(depth: usize) -> String {
    let mut text = String::from("0");
    for _ in 0..depth {
        text = format!("[{}{}]", text, ", 0".repeat(99));
    }
    format!("!ndarray {}", text)
}

#[test]
fn test_array_claimed_shape_is_not_trusted() {
    let registry = Registry::with_builtins();

    // 100^10 overflows the element count, 100^4 would be a large allocation
    for depth in [10, 4] {
        let text = lopsided_array(depth);
        let node = tagpack::from_text(&text).expect("parses");
        match registry.decode(&node, &NoResolver) {
            Err(Error::Malformed { tag, .. }) => assert_eq!(tag, tags::ARRAY),
            res => panic!("Expected Malformed at depth {}, got {:?}", depth, res),
        }
    }
}

#[test]
fn test_array_new_rejects_bad_shapes() {
    assert!(Array::new(vec![], vec![]).is_none());
    assert!(Array::new(vec![2, 2], vec![1.0; 3]).is_none());
    assert!(Array::new(vec![usize::MAX, 2], vec![]).is_none());
    assert!(Array::new(vec![2, 0, 3], vec![]).is_none());
    assert!(Array::new(vec![0, 3], vec![]).is_none());
    assert!(Array::from_rows(&[]).is_none());
    assert!(Array::from_rows(&[vec![1.0], vec![]]).is_none());
}

#[test]
fn test_array_empty_last_dimension_round_trip() -> Result<()> {
    let registry = Registry::with_builtins();

    for shape in [vec![0], vec![3, 0], vec![2, 1, 0]] {
        let array = Array::new(shape.clone(), vec![]).expect("trailing zero is allowed");
        assert_eq!(array.rank(), shape.len());

        let back = through_text(&registry, &array.clone().into(), &NoResolver)?;
        let back = back.downcast_ref::<Array>().expect("array");
        assert_eq!(back.shape(), shape.as_slice());
        assert_eq!(back, &array);
    }
    Ok(())
}

// ============================================================================
//  TRANSFORMS
// ============================================================================

#[test]
fn test_transform_round_trip_is_exact() -> Result<()> {
    let registry = Registry::with_builtins();
    let mut transform = Transform::translation(0.1, -2.0, 1e-9);
    transform.m[0][1] = 1.0 / 3.0;

    let back = through_text(&registry, &transform.into(), &NoResolver)?;
    assert_eq!(back.downcast_ref::<Transform>(), Some(&transform));
    Ok(())
}

#[test]
fn test_transform_wrong_rows() {
    let registry = Registry::with_builtins();
    let node = tagpack::from_text("!Transform [[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0]]").expect("parses");

    match registry.decode(&node, &NoResolver) {
        Err(Error::Malformed { reason, .. }) => assert_eq!(reason, "transform must have 4 rows"),
        res => panic!("Expected Malformed, got {:?}", res),
    }
}

#[test]
fn test_transform_wrong_columns() {
    let registry = Registry::with_builtins();
    let node = tagpack::from_text("!Transform [[1, 0, 0, 0], [0, 1, 0], [0, 0, 1, 0], [0, 0, 0, 1]]")
        .expect("parses");

    match registry.decode(&node, &NoResolver) {
        Err(Error::Malformed { reason, .. }) => assert_eq!(reason, "transform must have 4 columns"),
        res => panic!("Expected Malformed, got {:?}", res),
    }
}

#[test]
fn test_transform_from_array() -> Result<()> {
    let transform = Transform::translation(1.0, 2.0, 3.0);
    assert_eq!(Transform::try_from(&transform.to_array())?, transform);

    match Transform::try_from(&Array::from_vec(vec![1.0; 16])) {
        Err(Error::Malformed { tag, .. }) => assert_eq!(tag, tags::TRANSFORM),
        res => panic!("Expected Malformed, got {:?}", res),
    }
    Ok(())
}

// ============================================================================
//  REFERENCES
// ============================================================================

#[test]
fn test_body_round_trip() -> Result<()> {
    let mut scope = TestScope::new(1);
    let body = scope.add_body("test_box", &[]);
    let resolver = TestResolver::with(scope);
    let registry = Registry::with_builtins();

    let node = registry.encode(&body.clone().into())?;
    assert_eq!(tagpack::to_text(&node), r#"!scope::Body [1, "test_box"]"#);

    let back = through_text(&registry, &body.clone().into(), &resolver)?;
    assert_eq!(back.downcast_ref::<Body>(), Some(&body));
    Ok(())
}

#[test]
fn test_link_round_trip() -> Result<()> {
    let mut scope = TestScope::new(4);
    scope.add_body("test_box", &["base", "lid"]);
    let resolver = TestResolver::with(scope);
    let registry = Registry::with_builtins();

    let link = resolve_link(&resolver, ScopeId(4), "test_box", "lid")?;
    let node = registry.encode(&link.clone().into())?;
    assert_eq!(tagpack::to_text(&node), r#"!scope::Body::Link [4, "test_box", "lid"]"#);

    let back = through_text(&registry, &link.clone().into(), &resolver)?;
    let back = back.downcast_ref::<Link>().expect("link");
    assert_eq!(back, &link);
    assert_eq!(back.body().name(), "test_box");
    assert_eq!(back.downcast_ref::<String>().map(String::as_str), Some("test_box/lid"));
    Ok(())
}

#[test]
fn test_references_inside_containers() -> Result<()> {
    let mut scope = TestScope::new(2);
    let a = scope.add_body("a", &[]);
    let b = scope.add_body("b", &[]);
    let resolver = TestResolver::with(scope);
    let registry = Registry::with_builtins();

    let value = Value::Map(vec![
        ("bodies".into(), Value::List(vec![a.into(), b.into()])),
        ("pose".into(), Transform::IDENTITY.into()),
    ]);
    assert_eq!(through_text(&registry, &value, &resolver)?, value);
    Ok(())
}

#[test]
fn test_unresolved_scope() {
    let registry = Registry::with_builtins();
    let node = tagpack::from_text(r#"!scope::Body [9, "test_box"]"#).expect("parses");

    match registry.decode(&node, &NoResolver) {
        Err(Error::UnresolvedReference { scope, path }) => {
            assert_eq!(scope, ScopeId(9));
            assert!(path.is_empty());
        }
        res => panic!("Expected UnresolvedReference, got {:?}", res),
    }
}

#[test]
fn test_unresolved_body_after_removal() -> Result<()> {
    let mut scope = TestScope::new(1);
    let body = scope.add_body("test_box", &[]);
    let registry = Registry::with_builtins();
    let node = registry.encode(&body.into())?;

    // same scope id, body gone
    let resolver = TestResolver::with(TestScope::new(1));
    match registry.decode(&node, &resolver) {
        Err(Error::UnresolvedReference { scope, path }) => {
            assert_eq!(scope, ScopeId(1));
            assert_eq!(path, vec!["test_box".to_string()]);
        }
        res => panic!("Expected UnresolvedReference, got {:?}", res),
    }
    Ok(())
}

#[test]
fn test_unresolved_link() {
    let mut scope = TestScope::new(1);
    scope.add_body("test_box", &["base"]);
    let resolver = TestResolver::with(scope);
    let registry = Registry::with_builtins();
    let node = tagpack::from_text(r#"!scope::Body::Link [1, "test_box", "wheel"]"#).expect("parses");

    match registry.decode(&node, &resolver) {
        Err(Error::UnresolvedReference { path, .. }) => {
            assert_eq!(path, vec!["test_box".to_string(), "wheel".to_string()]);
        }
        res => panic!("Expected UnresolvedReference, got {:?}", res),
    }
}

#[test]
fn test_reference_bad_shape() {
    let registry = Registry::with_builtins();
    for text in [r#"!scope::Body [1]"#, r#"!scope::Body [-1, "a"]"#, r#"!scope::Body [1, 2]"#] {
        let node = tagpack::from_text(text).expect("parses");
        match registry.decode(&node, &NoResolver) {
            Err(Error::Malformed { tag, .. }) => assert_eq!(tag, tags::BODY),
            res => panic!("Expected Malformed for {}, got {:?}", text, res),
        }
    }
}

// ============================================================================
//  REGISTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Color(u8, u8, u8);

#[derive(Debug, Clone, PartialEq)]
struct Shade(u8);

fn encode_color(c: &Color) -> Result<Node> {
    Ok(Node::seq(vec![Node::Int(c.0.into()), Node::Int(c.1.into()), Node::Int(c.2.into())]))
}

fn decode_color(value: Value, _resolver: &dyn Resolver) -> Result<Value> {
    let channel = |v: &Value| v.as_i64().and_then(|n| u8::try_from(n).ok());
    let tag = Tag::from_static("Color");
    match value.as_list() {
        Some([r, g, b]) => match (channel(r), channel(g), channel(b)) {
            (Some(r), Some(g), Some(b)) => Ok(Value::object(Color(r, g, b))),
            _ => Err(Error::Malformed { tag, reason: "channels are 0..=255".into() }),
        },
        _ => Err(Error::Malformed { tag, reason: "expected [r, g, b]".into() }),
    }
}

#[test]
fn test_custom_type_round_trip() -> Result<()> {
    let mut registry = Registry::with_builtins();
    registry.register::<Color, _>("Color", encode_color, Decoder::children(decode_color));

    let value = Value::object(Color(255, 128, 0));
    assert_eq!(tagpack::to_text(&registry.encode(&value)?), "!Color [255, 128, 0]");
    assert_eq!(through_text(&registry, &value, &NoResolver)?, value);
    assert_eq!(registry.encode_typed(&Color(1, 2, 3))?, registry.encode(&Value::object(Color(1, 2, 3)))?);
    Ok(())
}

#[test]
fn test_tagged_scalar_decoder() -> Result<()> {
    let mut registry = Registry::new();
    registry.register::<Shade, _>(
        "Shade",
        |s: &Shade| Ok(Node::Int(s.0.into())),
        Decoder::children(|value, _| match value.as_i64().and_then(|n| u8::try_from(n).ok()) {
            Some(n) => Ok(Value::object(Shade(n))),
            None => Err(Error::Malformed { tag: Tag::from_static("Shade"), reason: "expected a byte".into() }),
        }),
    );

    let value = Value::object(Shade(7));
    assert_eq!(tagpack::to_text(&registry.encode(&value)?), "!Shade 7");
    assert_eq!(through_text(&registry, &value, &NoResolver)?, value);
    Ok(())
}

#[test]
fn test_decode_only_tag() -> Result<()> {
    let mut registry = Registry::new();
    registry.register_decoder(
        "Rgb",
        Decoder::raw(|node, _| {
            let text = node.as_str().and_then(|s| s.strip_prefix('#'));
            let channel = |i: usize| {
                let hex = text?.get(i..i + 2)?;
                u8::from_str_radix(hex, 16).ok()
            };
            match (channel(0), channel(2), channel(4)) {
                (Some(r), Some(g), Some(b)) => Ok(Value::object(Color(r, g, b))),
                _ => Err(Error::Malformed { tag: Tag::from_static("Rgb"), reason: "expected #rrggbb".into() }),
            }
        }),
    );

    let node = tagpack::from_text(r##"[!Rgb "#ff8000", !Rgb "#00000a"]"##).expect("parses");
    let value = registry.decode(&node, &NoResolver)?;
    assert_eq!(value, Value::List(vec![Value::object(Color(255, 128, 0)), Value::object(Color(0, 0, 10))]));

    // still nothing to encode with
    assert!(registry.knows_tag(&Tag::from_static("Rgb")));
    assert_eq!(registry.tag_of::<Color>(), None);
    match registry.encode(&Value::object(Color(1, 2, 3))) {
        Err(Error::UnencodableType(_)) => {}
        res => panic!("Expected UnencodableType, got {:?}", res),
    }
    Ok(())
}

#[test]
fn test_unknown_tag() {
    let registry = Registry::with_builtins();
    let node = tagpack::from_text("[1, !Mystery {a: 1}]").expect("parses");

    match registry.decode(&node, &NoResolver) {
        Err(Error::UnknownTag(tag)) => assert_eq!(tag.as_str(), "Mystery"),
        res => panic!("Expected UnknownTag, got {:?}", res),
    }
}

#[test]
fn test_unencodable_type() {
    let registry = Registry::with_builtins();
    let value = Value::List(vec![1.into(), Value::object(Color(0, 0, 0))]);

    match registry.encode(&value) {
        Err(Error::UnencodableType(name)) => assert!(name.ends_with("Color")),
        res => panic!("Expected UnencodableType, got {:?}", res),
    }
}

#[test]
fn test_empty_registry_has_no_builtins() {
    let registry = Registry::new();
    match registry.encode(&Transform::IDENTITY.into()) {
        Err(Error::UnencodableType(_)) => {}
        res => panic!("Expected UnencodableType, got {:?}", res),
    }
    assert!(!registry.knows_tag(&tags::TRANSFORM));
    assert!(Registry::default().knows_tag(&tags::TRANSFORM));
}

#[test]
fn test_reregistration_last_write_wins() -> Result<()> {
    let mut registry = Registry::with_builtins();
    registry.register::<Color, _>("Color", encode_color, Decoder::children(decode_color));
    registry.register::<Color, _>(
        "Rgb",
        |c: &Color| Ok(Node::str(format!("#{:02x}{:02x}{:02x}", c.0, c.1, c.2))),
        Decoder::children(|value, _| Ok(value)),
    );

    assert_eq!(registry.tag_of::<Color>(), Some(&Tag::from_static("Rgb")));
    let node = registry.encode(&Value::object(Color(255, 0, 16)))?;
    assert_eq!(tagpack::to_text(&node), r##"!Rgb "#ff0010""##);
    Ok(())
}

#[test]
fn test_tag_moves_between_types() -> Result<()> {
    let mut registry = Registry::new();
    registry.register::<Color, _>("Paint", encode_color, Decoder::children(decode_color));
    registry.register::<Shade, _>("Paint", |s: &Shade| Ok(Node::Int(s.0.into())), Decoder::children(|v, _| Ok(v)));

    assert_eq!(registry.tag_of::<Color>(), None);
    assert_eq!(registry.tag_of::<Shade>(), Some(&Tag::from_static("Paint")));
    match registry.encode(&Value::object(Color(1, 2, 3))) {
        Err(Error::UnencodableType(_)) => {}
        res => panic!("Expected UnencodableType, got {:?}", res),
    }
    Ok(())
}

#[test]
fn test_error_display() {
    let missing = Error::UnresolvedReference { scope: ScopeId(3), path: vec![] };
    assert_eq!(missing.to_string(), "scope-3 does not exist");

    let link = Error::UnresolvedReference { scope: ScopeId(3), path: vec!["box".into(), "lid".into()] };
    assert_eq!(link.to_string(), "no object 'box/lid' in scope-3");

    assert_eq!(Error::UnknownTag(Tag::from_static("X")).to_string(), "no decoder registered for tag '!X'");
}
