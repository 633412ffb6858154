//! TypeScript Generation Tests
//!
//! Validates that the status and command types can be exported to TypeScript
//! when the tauri feature is enabled.

#[cfg(feature = "tauri")]
#[test]
fn test_core_types_implement_specta_type() {
    use specta::Type;

    // If this compiles, all types are properly configured for TypeScript export.
    fn assert_type<T: Type>() {}

    assert_type::<rover_teleop::InputCommand>();
    assert_type::<rover_teleop::ControlStatus>();
    assert_type::<rover_teleop::ControlAuthority>();
    assert_type::<rover_teleop::Banner>();
    assert_type::<rover_teleop::CameraPosition>();
    assert_type::<rover_teleop::StreamMode>();
    assert_type::<rover_teleop::ConnectionState>();
    assert_type::<rover_teleop::stream::FrameRateState>();
    assert_type::<rover_teleop::ControllerKind>();
}

#[cfg(not(feature = "tauri"))]
#[test]
fn test_tauri_feature_disabled() {
    // Types still compile and serialize without specta::Type
    let text = serde_json::to_string(&rover_teleop::ControlAuthority::OperatorViewOnly).unwrap();
    assert_eq!(text, "\"operator_view_only\"");
}
