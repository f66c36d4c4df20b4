use std::path::Path;
use std::process::Command;

use tracing::{info, warn};

use crate::boot::{self, BootPartition, Mode};
use crate::config::{ProfileOptions, Settings, validate_device_boot_path};
use crate::error::{Error, Result};
use crate::firstrun::{self, FirstRun};
use crate::log_sanitize::sanitize_log_value;
use crate::modules;
use crate::patch::{self, PatchOutcome};
use crate::util;

/// Turns systemd units on or off on the machine we are running on.
pub trait ServiceManager {
    fn set_enabled(&mut self, unit: &str, enabled: bool) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct Systemctl;

impl ServiceManager for Systemctl {
    fn set_enabled(&mut self, unit: &str, enabled: bool) -> Result<()> {
        let verb = if enabled { "enable" } else { "disable" };
        let status = Command::new("systemctl")
            .args([verb, "--now", unit])
            .status()
            .map_err(|e| Error::msg(format!("failed to run systemctl {verb} {unit}: {e}")))?;
        if !status.success() {
            return Err(Error::msg(format!(
                "systemctl {verb} --now {unit} failed ({status})"
            )));
        }
        Ok(())
    }
}

/// Where the settings go and how file operations are carried out.
pub struct ApplyCtx {
    boot: BootPartition,
    mode: Mode,
    device_boot_path: String,
    dry_run: bool,
    services: Box<dyn ServiceManager>,
    firstrun: FirstRun,
}

impl ApplyCtx {
    pub fn new(boot: BootPartition, mode: Mode, device_boot_path: &str, dry_run: bool) -> Self {
        Self::with_services(
            boot,
            mode,
            device_boot_path,
            dry_run,
            Box::new(Systemctl),
        )
    }

    pub fn with_services(
        boot: BootPartition,
        mode: Mode,
        device_boot_path: &str,
        dry_run: bool,
        services: Box<dyn ServiceManager>,
    ) -> Self {
        Self {
            boot,
            mode,
            device_boot_path: device_boot_path.to_string(),
            dry_run,
            services,
            firstrun: FirstRun::default(),
        }
    }

    pub fn boot(&self) -> &BootPartition {
        &self.boot
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Commands queued for the first-boot script so far.
    pub fn pending_firstrun(&self) -> &FirstRun {
        &self.firstrun
    }

    pub fn set_config_value(
        &mut self,
        file: &Path,
        key: &str,
        value: Option<&str>,
    ) -> Result<PatchOutcome> {
        if self.dry_run {
            util::require_writable_file(file)?;
            let (_, outcome) = patch::patch_config_text(&util::read_text(file)?, key, value)?;
            info!(path = %file.display(), key, ?value, ?outcome, "dry-run: would patch");
            return Ok(outcome);
        }
        let outcome = patch::set_config_value(file, key, value)?;
        info!(path = %file.display(), key, ?value, ?outcome, "patched");
        Ok(outcome)
    }

    pub fn write_file(&mut self, path: &Path, contents: &str) -> Result<()> {
        if self.dry_run {
            info!(path = %path.display(), bytes = contents.len(), "dry-run: would write");
            return Ok(());
        }
        util::write_text(path, contents)?;
        info!(path = %path.display(), "wrote");
        Ok(())
    }

    pub fn touch(&mut self, path: &Path) -> Result<()> {
        if self.dry_run {
            info!(path = %path.display(), "dry-run: would create");
            return Ok(());
        }
        util::touch(path)?;
        info!(path = %path.display(), "created");
        Ok(())
    }

    pub fn remove(&mut self, path: &Path) -> Result<()> {
        if self.dry_run {
            info!(path = %path.display(), "dry-run: would remove");
            return Ok(());
        }
        if util::remove_file_if_exists(path)? {
            info!(path = %path.display(), "removed");
        }
        Ok(())
    }

    /// Card: queued for the first-boot script. Live: applied right away.
    pub fn set_service(&mut self, unit: &str, enabled: bool) -> Result<()> {
        match self.mode {
            Mode::Card => {
                self.firstrun.push_service(unit, enabled);
                info!(unit, enabled, "queued for first boot");
                Ok(())
            }
            Mode::Live if self.dry_run => {
                info!(unit, enabled, "dry-run: would toggle service");
                Ok(())
            }
            Mode::Live => {
                self.services.set_enabled(unit, enabled)?;
                info!(unit, enabled, "service toggled");
                Ok(())
            }
        }
    }

    /// Refuses to take over a `firstrun.sh` that another tool wrote.
    pub fn check_firstrun_script(&self) -> Result<()> {
        let path = self.boot.file(firstrun::SCRIPT_FILE);
        match util::read_text_opt(&path)? {
            Some(script) if !firstrun::is_managed(&script) => Err(Error::precondition(format!(
                "{} was written by another tool; let it run or remove it first",
                path.display()
            ))),
            _ => Ok(()),
        }
    }

    /// Writes the first-boot script (merged with any earlier one) and hooks it into `cmdline.txt`.
    pub fn finish(&mut self) -> Result<()> {
        if self.mode != Mode::Card || self.firstrun.is_empty() {
            return Ok(());
        }
        self.check_firstrun_script()?;
        let script_path = self.boot.file(firstrun::SCRIPT_FILE);
        let existing = util::read_text_opt(&script_path)?
            .map(|s| FirstRun::parse(&s))
            .unwrap_or_default();
        let merged = self.firstrun.merged_into(&existing);
        self.write_file(&script_path, &merged.render(&self.device_boot_path))?;

        let cmdline_path = self.boot.cmdline_txt();
        util::require_writable_file(&cmdline_path)?;
        let cmdline = util::read_text(&cmdline_path)?;
        let script = firstrun::script_device_path(&self.device_boot_path);
        if let Some(previous) = firstrun::cmdline_run_target(&cmdline).filter(|t| *t != script) {
            warn!(
                previous = %sanitize_log_value(previous),
                "replacing another systemd.run= hook in cmdline.txt"
            );
        }
        let hooked = firstrun::hook_cmdline(&cmdline, &script);
        if hooked != cmdline {
            self.write_file(&cmdline_path, &hooked)?;
        }
        Ok(())
    }
}

/// Runs every module that has something to do, then finalizes the boot partition.
pub fn apply(settings: &Settings, ctx: &mut ApplyCtx) -> Result<()> {
    if settings.is_empty() {
        warn!("nothing to apply");
        return Ok(());
    }
    info!(
        boot = %sanitize_log_value(&ctx.boot().dir().display().to_string()),
        mode = ?ctx.mode(),
        dry_run = ctx.dry_run(),
        "applying settings"
    );
    // Everything that can refuse the run does so before the first write.
    settings.check_mode(ctx.mode())?;
    if settings.queues_first_boot(ctx.mode()) {
        ctx.check_firstrun_script()?;
    }
    for m in modules::builtin_modules() {
        if m.detect(settings) {
            info!(module = m.id(), "running module");
            m.apply(settings, ctx)?;
        }
    }
    ctx.finish()
}

/// Checks preconditions for `opts`, then applies `settings` to the resolved boot partition.
pub fn run(opts: &ProfileOptions, settings: &Settings) -> Result<()> {
    validate_device_boot_path(&opts.device_boot_path)?;
    if opts.mode == Mode::Live && !opts.dry_run {
        boot::require_root()?;
    }
    let bp = boot::locate(opts.boot.as_deref(), opts.mode)?;
    if !opts.dry_run {
        bp.ensure_writable()?;
    }
    let mut ctx = ApplyCtx::new(bp, opts.mode, &opts.device_boot_path, opts.dry_run);
    apply(settings, &mut ctx)?;
    info!("done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FirstUser, SshSettings, VncSettings};
    use crate::error::ErrorKind;
    use crate::hdmi::Resolution;
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct Recorder(Rc<RefCell<Vec<(String, bool)>>>);

    impl ServiceManager for Recorder {
        fn set_enabled(&mut self, unit: &str, enabled: bool) -> Result<()> {
            self.0.borrow_mut().push((unit.to_string(), enabled));
            Ok(())
        }
    }

    const CMDLINE: &str = "console=tty1 root=PARTUUID=abcd-02 rootwait\n";

    fn boot_dir() -> (tempfile::TempDir, BootPartition) {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(
            tmp.path().join("config.txt"),
            "#hdmi_force_hotplug=1\n#hdmi_group=1\n#hdmi_mode=1\n",
        )
        .expect("config");
        fs::write(tmp.path().join("cmdline.txt"), CMDLINE).expect("cmdline");
        let bp = BootPartition::open(tmp.path()).expect("boot");
        (tmp, bp)
    }

    fn services_only(ssh: bool, vnc: bool) -> Settings {
        Settings {
            ssh: Some(SshSettings {
                enabled: ssh,
                user: None,
            }),
            vnc: Some(VncSettings { enabled: vnc }),
            ..Default::default()
        }
    }

    #[test]
    fn live_mode_toggles_services_directly() {
        let (_tmp, bp) = boot_dir();
        let rec = Recorder::default();
        let mut ctx = ApplyCtx::with_services(
            bp,
            Mode::Live,
            "/boot/firmware",
            false,
            Box::new(rec.clone()),
        );
        apply(&services_only(true, false), &mut ctx).expect("apply");
        assert_eq!(
            *rec.0.borrow(),
            vec![
                ("ssh.service".to_string(), true),
                ("vncserver-x11-serviced.service".to_string(), false)
            ]
        );
        assert!(ctx.pending_firstrun().is_empty());
        assert!(!ctx.boot().file(firstrun::SCRIPT_FILE).exists());
    }

    #[test]
    fn live_dry_run_touches_nothing() {
        let (_tmp, bp) = boot_dir();
        let rec = Recorder::default();
        let mut ctx = ApplyCtx::with_services(
            bp,
            Mode::Live,
            "/boot/firmware",
            true,
            Box::new(rec.clone()),
        );
        apply(&services_only(true, true), &mut ctx).expect("apply");
        assert!(rec.0.borrow().is_empty());
    }

    #[test]
    fn card_mode_queues_vnc_and_hooks_cmdline_once() {
        let (_tmp, bp) = boot_dir();
        let settings = services_only(true, true);
        for _ in 0..2 {
            let rec = Recorder::default();
            let mut ctx = ApplyCtx::with_services(
                bp.clone(),
                Mode::Card,
                "/boot/firmware",
                false,
                Box::new(rec.clone()),
            );
            apply(&settings, &mut ctx).expect("apply");
            assert!(rec.0.borrow().is_empty());
        }

        assert!(bp.file("ssh").is_file());
        let script = fs::read_to_string(bp.file(firstrun::SCRIPT_FILE)).expect("script");
        assert_eq!(
            FirstRun::parse(&script).commands(),
            ["systemctl enable vncserver-x11-serviced.service"]
        );
        let cmdline = fs::read_to_string(bp.cmdline_txt()).expect("cmdline");
        assert_eq!(cmdline.matches("systemd.run=").count(), 1, "{cmdline}");
        assert!(cmdline.ends_with("systemd.unit=kernel-command-line.target\n"));
    }

    #[test]
    fn card_dry_run_leaves_partition_unchanged() {
        let (_tmp, bp) = boot_dir();
        let before = fs::read_to_string(bp.config_txt()).expect("config");
        let mut settings = services_only(true, true);
        settings.hdmi = Some(Resolution::parse("2/82").expect("res"));
        let mut ctx = ApplyCtx::new(bp.clone(), Mode::Card, "/boot/firmware", true);
        apply(&settings, &mut ctx).expect("apply");

        assert_eq!(fs::read_to_string(bp.config_txt()).expect("config"), before);
        assert_eq!(fs::read_to_string(bp.cmdline_txt()).expect("cmdline"), CMDLINE);
        assert!(!bp.file("ssh").exists());
        assert!(!bp.file(firstrun::SCRIPT_FILE).exists());
    }

    #[test]
    fn live_first_user_is_refused_before_config_txt_changes() {
        let (_tmp, bp) = boot_dir();
        let before = fs::read_to_string(bp.config_txt()).expect("config");
        let settings = Settings {
            hdmi: Some(Resolution::parse("2/82").expect("res")),
            ssh: Some(SshSettings {
                enabled: true,
                user: Some(FirstUser::new("pi", "raspberry".into()).expect("user")),
            }),
            ..Default::default()
        };
        let rec = Recorder::default();
        let mut ctx = ApplyCtx::with_services(
            bp.clone(),
            Mode::Live,
            "/boot/firmware",
            false,
            Box::new(rec.clone()),
        );

        let err = apply(&settings, &mut ctx).expect_err("first user on a live system");
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(fs::read_to_string(bp.config_txt()).expect("config"), before);
        assert!(rec.0.borrow().is_empty());
    }

    #[test]
    fn foreign_firstrun_script_is_left_alone() {
        let (_tmp, bp) = boot_dir();
        let imager = "#!/bin/bash\n\nset +e\n\nimager_custom set_hostname mypi\n\
                      rm -f /boot/firstrun.sh\nexit 0\n";
        let hooked = "console=tty1 root=PARTUUID=abcd-02 rootwait systemd.run=/boot/firstrun.sh \
                      systemd.run_success_action=reboot systemd.unit=kernel-command-line.target\n";
        fs::write(bp.file(firstrun::SCRIPT_FILE), imager).expect("seed script");
        fs::write(bp.cmdline_txt(), hooked).expect("seed cmdline");
        let config_before = fs::read_to_string(bp.config_txt()).expect("config");

        let mut settings = services_only(true, true);
        settings.hdmi = Some(Resolution::parse("2/82").expect("res"));
        let mut ctx = ApplyCtx::new(bp.clone(), Mode::Card, "/boot/firmware", false);
        let err = apply(&settings, &mut ctx).expect_err("foreign firstrun.sh");

        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(
            fs::read_to_string(bp.file(firstrun::SCRIPT_FILE)).expect("script"),
            imager
        );
        assert_eq!(fs::read_to_string(bp.cmdline_txt()).expect("cmdline"), hooked);
        assert_eq!(fs::read_to_string(bp.config_txt()).expect("config"), config_before);
        assert!(!bp.file("ssh").exists());
    }

    #[test]
    fn foreign_script_does_not_block_settings_without_first_boot_commands() {
        let (_tmp, bp) = boot_dir();
        fs::write(bp.file(firstrun::SCRIPT_FILE), "#!/bin/bash\nexit 0\n").expect("seed");
        let settings = Settings {
            hdmi: Some(Resolution::parse("1/16").expect("res")),
            ..Default::default()
        };
        let mut ctx = ApplyCtx::new(bp.clone(), Mode::Card, "/boot/firmware", false);
        apply(&settings, &mut ctx).expect("apply");
        assert_eq!(
            fs::read_to_string(bp.file(firstrun::SCRIPT_FILE)).expect("script"),
            "#!/bin/bash\nexit 0\n"
        );
        assert_eq!(fs::read_to_string(bp.cmdline_txt()).expect("cmdline"), CMDLINE);
    }

    #[test]
    fn empty_settings_write_nothing() {
        let (_tmp, bp) = boot_dir();
        let mut ctx = ApplyCtx::new(bp.clone(), Mode::Card, "/boot/firmware", false);
        apply(&Settings::default(), &mut ctx).expect("apply");
        assert_eq!(fs::read_to_string(bp.cmdline_txt()).expect("cmdline"), CMDLINE);
    }
}
