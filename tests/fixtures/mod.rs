//! Shared test fixtures for E2E CLI tests.
#![allow(dead_code)] // Some fixtures are only used by some test binaries

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A minimal valid profile: one key, one fire-and-forget action.
pub const MINIMAL_PROFILE: &str = r#"<profile name="Minimal">
  <controls>
    <control kind="key" code="304">
      <action type="simple">
        <combination key="30"/>
      </action>
    </control>
  </controls>
</profile>
"#;

/// A profile exercising every element kind: identity match, a virtual
/// control, a shift level, a key control with nested dispatch, and a
/// virtual control profile.
pub const FULL_PROFILE: &str = r#"<profile name="Flight" autoLoad="true">
  <match name="T.16000M" vendor="0x044f" product="0xb10a"/>
  <virtualControls>
    <virtualControl name="mode">
      <state>
        <single kind="key" code="288" value="1"/>
      </state>
      <state/>
    </virtualControl>
  </virtualControls>
  <shiftLevels>
    <shiftLevel>
      <state/>
      <state>
        <single kind="key" code="293" value="1"/>
      </state>
    </shiftLevel>
  </shiftLevels>
  <controls>
    <control kind="key" code="304">
      <shift from="0" to="0">
        <action type="simple" repeatDelay="150">
          <combination key="30" modifiers="29,42"/>
        </action>
      </shift>
      <shift from="1" to="1">
        <action type="advanced">
          <enter>
            <press code="31"/>
            <delay ms="25"/>
            <release code="31"/>
          </enter>
          <repeat>
            <press code="32"/>
            <release code="32"/>
            <delay ms="75"/>
          </repeat>
          <leave>
            <press code="33"/>
            <release code="33"/>
          </leave>
        </action>
      </shift>
    </control>
    <control kind="virtual" name="mode">
      <forState value="0">
        <shift from="0" to="1">
          <action type="simple">
            <combination key="57"/>
          </action>
        </shift>
      </forState>
    </control>
  </controls>
</profile>
"#;

/// A profile whose handler tree leaves a shift state uncovered.
pub const INCOMPLETE_PROFILE: &str = r#"<profile name="Broken">
  <shiftLevels>
    <shiftLevel>
      <state/>
      <state>
        <single kind="key" code="293" value="1"/>
      </state>
    </shiftLevel>
  </shiftLevels>
  <controls>
    <control kind="key" code="304">
      <shift from="0" to="0">
        <action type="simple">
          <combination key="30"/>
        </action>
      </shift>
    </control>
  </controls>
</profile>
"#;

/// Writes a profile document into a fresh temp directory.
///
/// Returns the file path and the guard keeping the directory alive.
pub fn write_temp_profile(contents: &str) -> (PathBuf, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("profile.xml");
    fs::write(&path, contents).expect("write profile fixture");
    (path, dir)
}

/// Path to the stickshift binary under test.
pub fn stickshift_bin() -> &'static str {
    env!("CARGO_BIN_EXE_stickshift")
}
