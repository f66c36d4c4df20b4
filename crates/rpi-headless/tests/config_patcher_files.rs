use std::fs;
use std::path::Path;

use rpi_headless::ErrorKind;
use rpi_headless::hdmi::Resolution;
use rpi_headless::patch::{PatchOutcome, set_config_value};

const STOCK_CONFIG: &str = "\
# For more options and information see
# http://rptl.io/configtxt
dtparam=audio=on

# uncomment if hdmi display is not detected and composite is being output
#hdmi_force_hotplug=1

# uncomment to force a specific HDMI mode (this will force VGA)
#hdmi_group=1
#hdmi_mode=1

[all]
";

fn apply_resolution(path: &Path, raw: &str) -> rpi_headless::Result<()> {
    let res = Resolution::parse(raw)?;
    for (key, value) in res.assignments() {
        set_config_value(path, key, value.as_deref())?;
    }
    Ok(())
}

#[test]
fn set_group_and_mode_from_templates() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = tmp.path().join("config.txt");
    fs::write(&cfg, "#hdmi_group=1\n#hdmi_mode=4\n").expect("write config");

    set_config_value(&cfg, "hdmi_group", Some("2")).expect("group");
    set_config_value(&cfg, "hdmi_mode", Some("35")).expect("mode");

    assert_eq!(
        fs::read_to_string(&cfg).expect("read"),
        "hdmi_group=2\nhdmi_mode=35\n"
    );
}

#[test]
fn unset_group_leaves_mode_alone() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = tmp.path().join("config.txt");
    fs::write(&cfg, "hdmi_group=2\nhdmi_mode=35\n").expect("write config");

    let outcome = set_config_value(&cfg, "hdmi_group", None).expect("unset");
    assert_eq!(outcome, PatchOutcome::Disabled);
    assert_eq!(
        fs::read_to_string(&cfg).expect("read"),
        "#hdmi_group=\nhdmi_mode=35\n"
    );
}

#[test]
fn out_of_range_mode_is_rejected_before_any_write() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = tmp.path().join("config.txt");
    fs::write(&cfg, STOCK_CONFIG).expect("write config");

    let err = apply_resolution(&cfg, "1/108").expect_err("1/108 must fail");
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert_eq!(err.exit_code(), 2);
    assert_eq!(fs::read_to_string(&cfg).expect("read"), STOCK_CONFIG);
}

#[test]
fn auto_resolution_sets_only_group_zero() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = tmp.path().join("config.txt");
    fs::write(&cfg, STOCK_CONFIG).expect("write config");

    apply_resolution(&cfg, "2/82").expect("fixed");
    apply_resolution(&cfg, "0").expect("auto");

    let got = fs::read_to_string(&cfg).expect("read");
    assert!(got.contains("\n#hdmi_force_hotplug=\n"), "{got}");
    assert!(got.contains("\nhdmi_group=0\n"), "{got}");
    assert!(got.contains("\n#hdmi_mode=\n"), "{got}");
    assert!(!got.contains("hdmi_mode=82"), "{got}");
}

#[test]
fn rerunning_a_resolution_is_a_fixed_point() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = tmp.path().join("config.txt");
    fs::write(&cfg, STOCK_CONFIG).expect("write config");

    apply_resolution(&cfg, "2/82").expect("first");
    let once = fs::read_to_string(&cfg).expect("read");
    apply_resolution(&cfg, "2/82").expect("second");
    let twice = fs::read_to_string(&cfg).expect("read");
    assert_eq!(once, twice);

    for key in ["hdmi_force_hotplug=1", "hdmi_group=2", "hdmi_mode=82"] {
        let n = once.lines().filter(|l| *l == key).count();
        assert_eq!(n, 1, "{key} in:\n{once}");
    }

    // Unrelated lines keep their order.
    let others = |s: &str| -> Vec<String> {
        s.lines()
            .filter(|l| !l.contains("hdmi_"))
            .map(str::to_string)
            .collect()
    };
    assert_eq!(others(&once), others(STOCK_CONFIG));
}

#[test]
fn key_without_template_is_not_appended() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = tmp.path().join("config.txt");
    fs::write(&cfg, "dtparam=audio=on\n").expect("write config");

    let outcome = set_config_value(&cfg, "hdmi_group", Some("2")).expect("patch");
    assert_eq!(outcome, PatchOutcome::Untouched);
    assert_eq!(fs::read_to_string(&cfg).expect("read"), "dtparam=audio=on\n");
}

#[test]
fn missing_file_is_a_precondition_error() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let err = set_config_value(&tmp.path().join("nope.txt"), "hdmi_group", Some("2"))
        .expect_err("missing file");
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(!tmp.path().join("nope.txt").exists());
}

#[cfg(unix)]
#[test]
fn patched_file_keeps_its_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = tmp.path().join("config.txt");
    fs::write(&cfg, STOCK_CONFIG).expect("write config");
    fs::set_permissions(&cfg, fs::Permissions::from_mode(0o640)).expect("chmod");

    set_config_value(&cfg, "hdmi_group", Some("2")).expect("patch");
    let mode = fs::metadata(&cfg).expect("stat").permissions().mode() & 0o777;
    assert_eq!(mode, 0o640);

    let leftovers: Vec<_> = fs::read_dir(tmp.path())
        .expect("read_dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}
