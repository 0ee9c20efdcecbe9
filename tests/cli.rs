use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::io::Write;
use std::process::Command;
use tempfile::{tempdir, NamedTempFile};

const SLIDER_SCENE: &str = r#"<mujoco model="slider">
  <option timestep="0.005"/>
  <worldbody>
    <body name="carriage" pos="0 0 1">
      <joint name="rail" type="slide" axis="1 0 0"/>
      <geom type="box" size="0.1 0.1 0.1" mass="1"/>
    </body>
  </worldbody>
</mujoco>
"#;

fn viewer_cmd() -> Command {
    Command::cargo_bin("mjcf-viewer").expect("binary exists")
}

#[test]
fn summary_of_default_scene() {
    viewer_cmd()
        .arg("--summary-only")
        .assert()
        .success()
        .stdout(contains("Loaded scene simple.xml with 4 bodies"))
        .stdout(contains(" - body 3 target (parent 0, mass"))
        .stdout(contains("Final body states (t = 0.000 s):"))
        .stdout(contains(" - box pos=("));
}

#[test]
fn headless_frames_advance_the_simulation() {
    viewer_cmd()
        .args(["pendulum.xml", "--summary-only", "--frames", "30", "--seed", "7"])
        .assert()
        .success()
        .stdout(contains("Loaded scene pendulum.xml with 3 bodies"))
        .stdout(contains("2 keyframes"))
        .stdout(contains("Simulated 30 frame(s)"))
        .stdout(contains(" - lower pos=("));
}

#[test]
fn paused_run_takes_no_steps() {
    viewer_cmd()
        .args(["--summary-only", "--frames", "10", "--paused"])
        .assert()
        .success()
        .stdout(contains("Simulated 10 frame(s), 0 step(s)"))
        .stdout(contains("(t = 0.000 s)"));
}

#[test]
fn scenes_dir_replaces_bundled_library() {
    let dir = tempdir().expect("temp dir");
    fs::create_dir_all(dir.path().join("rigs")).expect("create subdir");
    fs::write(dir.path().join("rigs/slider.xml"), SLIDER_SCENE).expect("write scene");

    viewer_cmd()
        .arg("--scenes-dir")
        .arg(dir.path())
        .args(["rigs/slider.xml", "--summary-only"])
        .assert()
        .success()
        .stdout(contains("Loaded scene rigs/slider.xml with 2 bodies"))
        .stdout(contains(" - carriage pos=("));

    viewer_cmd()
        .arg("--scenes-dir")
        .arg(dir.path())
        .arg("--summary-only")
        .assert()
        .failure()
        .stderr(contains("simple.xml"));
}

#[test]
fn scene_path_on_disk_is_imported() {
    let mut file = NamedTempFile::new().expect("temp scene");
    file.write_all(SLIDER_SCENE.as_bytes()).expect("write scene");

    viewer_cmd()
        .arg(file.path())
        .arg("--summary-only")
        .assert()
        .success()
        .stdout(contains("with 2 bodies"))
        .stdout(contains(" - body 1 carriage (parent 0, mass 1.000)"));
}

#[test]
fn config_file_selects_scene() {
    let mut config = NamedTempFile::new().expect("temp config");
    writeln!(config, "initial_scene = \"model_with_tendon.xml\"").expect("write config");
    writeln!(config, "seed = 3").expect("write config");
    writeln!(config, "[params]").expect("write config");
    writeln!(config, "paused = true").expect("write config");

    viewer_cmd()
        .arg("--config")
        .arg(config.path())
        .args(["--summary-only", "--frames", "5"])
        .assert()
        .success()
        .stdout(contains("Loaded scene model_with_tendon.xml"))
        .stdout(contains("1 tendons"))
        .stdout(contains("0 step(s)"));
}

#[test]
fn unknown_scene_fails() {
    viewer_cmd()
        .args(["missing.xml", "--summary-only"])
        .assert()
        .failure()
        .stderr(contains("failed to load scene missing.xml"));
}

#[test]
fn malformed_config_fails() {
    let mut config = NamedTempFile::new().expect("temp config");
    writeln!(config, "initial_scene = [").expect("write config");

    viewer_cmd()
        .arg("--config")
        .arg(config.path())
        .arg("--summary-only")
        .assert()
        .failure()
        .stderr(contains("failed to read config"));
}
