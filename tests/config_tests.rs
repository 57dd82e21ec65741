use splash_fluid::context::{Capabilities, Channels, ContextTier, TexelType, TextureFormat};
use splash_fluid::config::{MAX_RESOLUTION, SOFTWARE_DYE_RESOLUTION};
use splash_fluid::{Color, ConfigUpdate, SimulationConfig};

fn caps(linear_filtering: bool) -> Capabilities {
    let format = TextureFormat::new(Channels::Rgba, TexelType::HalfFloat);
    Capabilities {
        tier: ContextTier::Baseline,
        texel_type: TexelType::HalfFloat,
        linear_filtering,
        rgba: format,
        rg: format,
        r: format,
    }
}

#[test]
fn test_missing_options_take_defaults() {
    let config = SimulationConfig::from_json(r#"{"curl": 30, "backColor": {"r": 0.0, "g": 0.1, "b": 0.2}}"#)
        .expect("valid config");
    assert_eq!(config.curl, 30.0);
    assert_eq!(config.back_color, Color::new(0.0, 0.1, 0.2));
    assert_eq!(config.sim_resolution, SimulationConfig::default().sim_resolution);
    assert!(SimulationConfig::from_json(r#"{"bogus": 1}"#).is_err());
}

#[test]
fn test_json_uses_camel_case_names() {
    let json = SimulationConfig::default().to_json().expect("serializes");
    assert!(json.contains("\"densityDissipation\""));
    assert!(json.contains("\"pressureIterations\""));
    assert_eq!(SimulationConfig::from_json(&json).expect("parses"), SimulationConfig::default());
}

#[test]
fn test_apply_reports_what_changed() {
    let mut config = SimulationConfig::default();
    let change = config.apply(&ConfigUpdate {
        splat_radius: Some(0.5),
        ..ConfigUpdate::default()
    });
    assert_eq!(config.splat_radius, 0.5);
    assert!(!change.resolution && !change.keywords);

    let change = config.apply(&ConfigUpdate {
        dye_resolution: Some(512),
        shading: Some(false),
        ..ConfigUpdate::default()
    });
    assert!(change.resolution);
    assert!(change.keywords);

    let unchanged = config.apply(&ConfigUpdate::from(&config.clone()));
    assert_eq!(unchanged, Default::default(), "Re-applying the same values changes nothing");
}

#[test]
fn test_restriction_without_linear_filtering() {
    let mut config = SimulationConfig::default();
    config.restrict_to(&caps(true));
    assert_eq!(config, SimulationConfig::default());

    config.restrict_to(&caps(false));
    assert_eq!(config.dye_resolution, 256);
    assert!(!config.shading);
}

#[test]
fn test_resolutions_are_clamped() {
    let config = SimulationConfig::from_json(r#"{"simResolution": 70000, "dyeResolution": 70000}"#).expect("valid config");
    assert_eq!(config.sim_resolution, MAX_RESOLUTION);
    assert_eq!(config.dye_resolution, MAX_RESOLUTION);

    let mut config = SimulationConfig::default();
    let change = config.apply(&ConfigUpdate {
        dye_resolution: Some(u32::MAX),
        ..ConfigUpdate::default()
    });
    assert!(change.resolution);
    assert_eq!(config.dye_resolution, MAX_RESOLUTION);
    assert_eq!(config.sim_resolution, SimulationConfig::default().sim_resolution);
}

#[test]
fn test_software_hosts_cap_dye_resolution() {
    let mut config = SimulationConfig::default();
    config.restrict_to_software();
    assert_eq!(config.dye_resolution, SOFTWARE_DYE_RESOLUTION);
    assert!(config.shading, "Only the dye resolution is restricted");

    config.dye_resolution = 128;
    config.restrict_to_software();
    assert_eq!(config.dye_resolution, 128, "Lower resolutions are kept");
}

#[test]
fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("splash_config_{}.json", std::process::id()));
    std::fs::write(&path, r#"{"paused": true, "splatForce": 1200}"#).expect("write config");
    let config = SimulationConfig::load(&path).expect("config loads");
    assert!(config.paused);
    assert_eq!(config.splat_force, 1200.0);
    std::fs::remove_file(&path).ok();

    assert!(SimulationConfig::load(&path).is_err(), "Missing file is an error");
}
