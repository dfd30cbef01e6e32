use sendspin_player::audio::VolumeController;

#[test]
fn test_gain_is_product_of_group_and_player() {
    let volume = VolumeController::new(50, false);
    volume.set_group_volume(80, false);
    assert!((volume.effective_gain() - 0.4).abs() < 1e-6);
}

#[test]
fn test_either_mute_silences() {
    let volume = VolumeController::new(100, false);
    volume.set_group_volume(100, true);
    assert_eq!(volume.effective_gain(), 0.0);

    volume.set_group_volume(100, false);
    volume.set_player_volume(100, true);
    assert_eq!(volume.effective_gain(), 0.0);
}

#[test]
fn test_values_are_clamped() {
    let volume = VolumeController::new(200, false);
    assert_eq!(volume.player_volume(), (100, false));
    volume.set_group_volume(255, false);
    assert_eq!(volume.group_volume(), (100, false));
}

#[test]
fn test_group_reset_keeps_player_choice() {
    let volume = VolumeController::new(30, true);
    volume.set_group_volume(10, true);
    volume.reset_group();
    assert_eq!(volume.group_volume(), (100, false));
    assert_eq!(volume.player_volume(), (30, true));
}

#[test]
fn test_clones_share_state() {
    let volume = VolumeController::new(100, false);
    let audio_side = volume.clone();
    volume.set_player_volume(20, false);
    assert!((audio_side.effective_gain() - 0.2).abs() < 1e-6);
}
