//! Dereference engine tests against a mock machine state.

mod common;

use common::MockState;

use cantata_pointer::{
    dereference, Data, DereferenceOptions, Pointer, PointerError, Template,
};
use indexmap::IndexMap;

fn parse(text: &str) -> Pointer {
    serde_json::from_str(text).expect("test pointer parses")
}

fn view_regions(
    pointer: &Pointer,
    state: &MockState,
) -> Result<Vec<(Option<String>, Option<u64>, Option<u64>)>, PointerError> {
    let cursor = dereference(pointer, DereferenceOptions::default());
    let view = cursor.view(state)?;
    Ok(view
        .regions
        .iter()
        .map(|r| {
            (
                r.name.clone(),
                r.offset.as_ref().and_then(Data::as_u64),
                r.length.as_ref().and_then(Data::as_u64),
            )
        })
        .collect())
}

#[test]
fn region_length_may_reference_its_own_offset() {
    let pointer = parse(
        r#"{"name":"a","location":"memory","offset":64,"length":{".offset":"$this"}}"#,
    );
    let regions = view_regions(&pointer, &MockState::default()).unwrap();
    assert_eq!(regions, vec![(Some("a".into()), Some(64), Some(64))]);
}

#[test]
fn region_offset_may_reference_its_own_length() {
    // Resolution order is slot, offset, length; this forces length on
    // demand while offset is still being computed.
    let pointer = parse(
        r#"{"name":"a","location":"memory","offset":{"$sum":[{".length":"$this"},32]},"length":16}"#,
    );
    let regions = view_regions(&pointer, &MockState::default()).unwrap();
    assert_eq!(regions, vec![(Some("a".into()), Some(48), Some(16))]);
}

#[test]
fn mutual_self_reference_is_a_circular_reference_error() {
    let pointer = parse(
        r#"{"name":"a","location":"memory","offset":{".length":"$this"},"length":{".offset":"$this"}}"#,
    );
    let err = view_regions(&pointer, &MockState::default()).unwrap_err();
    assert_eq!(err, PointerError::CircularReference("offset"));
    assert_eq!(
        err.to_string(),
        "Circular reference detected: $this.offset"
    );
}

#[test]
fn group_members_see_earlier_siblings() {
    let pointer = parse(
        r#"{"group":[
            {"name":"head","location":"memory","offset":128,"length":32},
            {"name":"tail","location":"memory","offset":{"$sum":[{".offset":"head"},{".length":"head"}]},"length":32}
        ]}"#,
    );
    let regions = view_regions(&pointer, &MockState::default()).unwrap();
    assert_eq!(
        regions,
        vec![
            (Some("head".into()), Some(128), Some(32)),
            (Some("tail".into()), Some(160), Some(32)),
        ]
    );
}

#[test]
fn later_siblings_are_not_visible_earlier() {
    let pointer = parse(
        r#"{"group":[
            {"name":"a","location":"memory","offset":{".offset":"b"},"length":32},
            {"name":"b","location":"memory","offset":0,"length":32}
        ]}"#,
    );
    let err = view_regions(&pointer, &MockState::default()).unwrap_err();
    assert_eq!(err, PointerError::UnknownRegion("b".into()));
}

#[test]
fn list_yields_count_regions_sharing_a_name() {
    let pointer = parse(
        r#"{"list":{"count":3,"each":"i","is":
            {"name":"item","location":"memory","offset":{"$product":["i","$wordsize"]},"length":"$wordsize"}
        }}"#,
    );
    let cursor = dereference(&pointer, DereferenceOptions::default());
    let state = MockState::default();
    let view = cursor.view(&state).unwrap();

    assert_eq!(view.regions.len(), 3);
    let items: Vec<_> = view.regions.named("item").collect();
    assert_eq!(items.len(), 3);
    for (i, item) in items.iter().enumerate() {
        assert_eq!(item.offset.as_ref().unwrap().as_u64(), Some(i as u64 * 32));
    }
}

#[test]
fn conditional_on_zero_difference_takes_the_else_branch() {
    let pointer = parse(
        r#"{"if":{"$difference":[5,5]},
            "then":{"name":"a","location":"memory","offset":0,"length":32},
            "else":{"name":"b","location":"memory","offset":32,"length":32}}"#,
    );
    let regions = view_regions(&pointer, &MockState::default()).unwrap();
    assert_eq!(regions, vec![(Some("b".into()), Some(32), Some(32))]);
}

#[test]
fn conditional_without_else_may_yield_nothing() {
    let pointer = parse(
        r#"{"if":0,"then":{"name":"a","location":"memory","offset":0,"length":32}}"#,
    );
    let regions = view_regions(&pointer, &MockState::default()).unwrap();
    assert!(regions.is_empty());
}

#[test]
fn read_drives_a_dynamic_list_count() {
    // Storage slot 0 holds the element count; elements live at slots 1..=n.
    let mut state = MockState::default();
    state.set_storage_u64(0, 2);
    state.set_storage_u64(1, 0xaaaa);
    state.set_storage_u64(2, 0xbbbb);

    let pointer = parse(
        r#"{"group":[
            {"name":"len","location":"storage","slot":0},
            {"list":{"count":{"$read":"len"},"each":"i","is":
                {"name":"item","location":"storage","slot":{"$sum":["i",1]}}
            }}
        ]}"#,
    );
    let cursor = dereference(&pointer, DereferenceOptions::default());
    let view = cursor.view(&state).unwrap();

    let items: Vec<_> = view.regions.named("item").collect();
    assert_eq!(items.len(), 2);
    let values: Vec<_> = items
        .iter()
        .map(|item| view.read(item).unwrap().as_u64().unwrap())
        .collect();
    assert_eq!(values, vec![0xaaaa, 0xbbbb]);
}

#[test]
fn scope_defines_are_visible_only_inside() {
    let pointer = parse(
        r#"{"group":[
            {"define":{"base":128},"in":{"name":"a","location":"memory","offset":"base","length":32}},
            {"name":"b","location":"memory","offset":"base","length":32}
        ]}"#,
    );
    let err = view_regions(&pointer, &MockState::default()).unwrap_err();
    assert_eq!(err, PointerError::UnknownVariable("base".into()));
}

#[test]
fn templates_expand_with_bound_variables() {
    let template: Template = serde_json::from_str(
        r#"{"expect":["slot"],"for":{"name":"word","location":"storage","slot":"slot"}}"#,
    )
    .unwrap();
    let mut templates = IndexMap::new();
    templates.insert("storage-word".to_string(), template);

    let pointer = parse(r#"{"define":{"slot":7},"in":{"template":"storage-word"}}"#);
    let cursor = dereference(&pointer, DereferenceOptions { templates: templates.clone() });

    let mut state = MockState::default();
    state.set_storage_u64(7, 99);
    let view = cursor.view(&state).unwrap();
    let word = view.regions.named_latest("word").unwrap();
    assert_eq!(view.read(word).unwrap().as_u64(), Some(99));

    // The same template without its expected binding fails upfront.
    let bare = parse(r#"{"template":"storage-word"}"#);
    let cursor = dereference(&bare, DereferenceOptions { templates });
    assert_eq!(
        cursor.view(&state).unwrap_err(),
        PointerError::UnboundTemplateVariable {
            template: "storage-word".into(),
            variable: "slot".into(),
        }
    );
}

#[test]
fn stack_regions_peek_by_depth() {
    let mut state = MockState::default();
    let mut top = [0u8; 32];
    top[31] = 0x11;
    let mut below = [0u8; 32];
    below[31] = 0x22;
    state.stack.push(below);
    state.stack.push(top);

    let pointer = parse(r#"{"name":"second","location":"stack","slot":1}"#);
    let cursor = dereference(&pointer, DereferenceOptions::default());
    let view = cursor.view(&state).unwrap();
    let region = view.regions.get(0).unwrap();
    // Default slice covers the full word.
    let word = view.read(region).unwrap();
    assert_eq!(word.len(), 32);
    assert_eq!(word.as_u64(), Some(0x22));
}

#[test]
fn views_are_pure_per_state() {
    let pointer = parse(r#"{"name":"len","location":"storage","slot":0}"#);
    let cursor = dereference(&pointer, DereferenceOptions::default());

    let mut state_a = MockState::default();
    state_a.set_storage_u64(0, 1);
    let mut state_b = MockState::default();
    state_b.set_storage_u64(0, 2);

    let a = cursor.view(&state_a).unwrap();
    let b = cursor.view(&state_b).unwrap();
    let ra = a.regions.get(0).unwrap();
    let rb = b.regions.get(0).unwrap();
    assert_eq!(a.read(ra).unwrap().as_u64(), Some(1));
    assert_eq!(b.read(rb).unwrap().as_u64(), Some(2));
    // Viewing b did not disturb a.
    assert_eq!(a.read(ra).unwrap().as_u64(), Some(1));
}

#[test]
fn memory_regions_require_offset_and_length() {
    let pointer = parse(r#"{"name":"m","location":"memory","offset":0}"#);
    let cursor = dereference(&pointer, DereferenceOptions::default());
    let state = MockState {
        memory: vec![0; 64],
        ..Default::default()
    };
    let view = cursor.view(&state).unwrap();
    let region = view.regions.get(0).unwrap();
    assert_eq!(
        view.read(region).unwrap_err(),
        PointerError::MissingRegionProperty {
            region: "m".into(),
            property: "length",
        }
    );
}
