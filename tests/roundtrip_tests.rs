//! Round-trip law: parse -> serialize -> reparse yields an equal graph.

use stickshift::names::NameDb;
use stickshift::parser::{parse_profile_str, write_profile};

mod fixtures;
use fixtures::{FULL_PROFILE, MINIMAL_PROFILE};

fn names() -> NameDb {
    NameDb::load().expect("embedded name database loads")
}

#[test]
fn test_minimal_round_trip() {
    let db = names();
    let original = parse_profile_str(MINIMAL_PROFILE, &db).unwrap();
    let reparsed = parse_profile_str(&write_profile(&original), &db).unwrap();
    assert_eq!(original, reparsed);
}

#[test]
fn test_full_round_trip() {
    let db = names();
    let original = parse_profile_str(FULL_PROFILE, &db).unwrap();
    let serialized = write_profile(&original);
    let reparsed = parse_profile_str(&serialized, &db).unwrap();
    assert_eq!(original, reparsed);

    // A second cycle reproduces the document byte for byte.
    assert_eq!(serialized, write_profile(&reparsed));
}

#[test]
fn test_round_trip_preserves_axis_ranges_and_hex_ids() {
    let db = names();
    let document = r#"<profile name="Axes" autoLoad="false">
      <match vendor="0x045e"/>
      <virtualControls>
        <virtualControl name="zones">
          <state><range kind="axis" code="6" from="0" to="63"/></state>
          <state><range kind="axis" code="6" from="64" to="191"/></state>
          <state><range kind="axis" code="6" from="192" to="255"/></state>
        </virtualControl>
      </virtualControls>
      <controls>
        <control kind="virtual" name="zones">
          <forState value="2">
            <action type="simple"><combination key="57"/></action>
          </forState>
        </control>
      </controls>
    </profile>
    "#;
    let original = parse_profile_str(document, &db).unwrap();
    let reparsed = parse_profile_str(&write_profile(&original), &db).unwrap();
    assert_eq!(original, reparsed);
    assert_eq!(reparsed.identity.vendor, Some(0x045e));
    assert_eq!(reparsed.virtual_controls()[0].num_states(), 3);
}

#[test]
fn test_name_references_normalize_to_codes() {
    let db = names();
    // Symbolic names in the input document...
    let document = r#"<profile name="Named">
      <virtualControls>
        <virtualControl name="mode">
          <state><single kind="key" name="BTN_TRIGGER" value="1"/></state>
          <state/>
        </virtualControl>
      </virtualControls>
      <controls>
        <control kind="key" name="BTN_SOUTH">
          <action type="simple"><combination key="KEY_SPACE" modifiers="LSHIFT"/></action>
        </control>
      </controls>
    </profile>
    "#;
    let parsed = parse_profile_str(document, &db).unwrap();
    let serialized = write_profile(&parsed);

    // ...come back out as stable numeric codes.
    assert!(serialized.contains("code=\"288\""));
    assert!(serialized.contains("code=\"304\""));
    assert!(serialized.contains("key=\"57\""));
    assert!(serialized.contains("modifiers=\"42\""));

    let reparsed = parse_profile_str(&serialized, &db).unwrap();
    assert_eq!(parsed, reparsed);
}
