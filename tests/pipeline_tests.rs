//! End-to-end installer runs against the recording executor and scripted
//! prompter. Nothing here touches a real disk.

use std::path::PathBuf;

use miniarch::command::{Executor, RecordingExecutor, SideEffect};
use miniarch::disks::DiskInspector;
use miniarch::hardware::{CPUINFO_PATH, EFI_FIRMWARE_DIR};
use miniarch::installer::{CANCEL, EXIT, INSTALL, InstallOptions, Installer, REBOOT_NOW};
use miniarch::prompt::{Answer, ScriptedPrompter};
use miniarch::system::{SUDOERS_MODE, SUDOERS_RULE};
use miniarch::{InstallError, InstallStage, InterruptFlag};

const SATA_LSBLK: &str = "sdx 20G disk\nsdx1 1G part\nsdx2 19G part\nsr0 1024M rom\n";
const SATA_MOUNTS: &str = "sdx\nsdx1 /mnt/boot\nsdx2 /mnt\n";

fn sata_host(vendor: &str) -> RecordingExecutor {
    let mut exec = RecordingExecutor::new();
    exec.add_dir(EFI_FIRMWARE_DIR)
        .add_file(CPUINFO_PATH, &format!("processor\t: 0\nvendor_id\t: {}\n", vendor))
        .respond("lsblk -n -r -o NAME,SIZE,TYPE", SATA_LSBLK)
        .respond("lsblk -n -r -o NAME,MOUNTPOINT", SATA_MOUNTS)
        .respond("genfstab", "UUID=abcd / ext4 rw,relatime 0 1\n");
    exec
}

/// Answers up to, but not including, the confirmation gate:
/// /dev/sdx, root password, user alice, linux/amd/bspwm/grub, swap, en_US.
fn sata_answers() -> Vec<Answer> {
    vec![
        Answer::choice("/dev/sdx (20G)"),
        Answer::text("toor"),
        Answer::text("toor"),
        Answer::choice("Yes"),
        Answer::text("alice"),
        Answer::text("hunter2"),
        Answer::text("hunter2"),
        Answer::choice("linux"),
        Answer::choice("amd"),
        Answer::choice("bspwm"),
        Answer::choice("grub"),
        Answer::choice("Yes"),
        Answer::choice("en_US.UTF-8"),
        Answer::Select(0),
        Answer::Select(0),
        Answer::Select(0),
        Answer::Select(0),
    ]
}

fn confirmed(mut answers: Vec<Answer>, completion: &str) -> Vec<Answer> {
    answers.push(Answer::choice(INSTALL));
    answers.push(Answer::choice(completion));
    answers
}

fn installer(
    exec: RecordingExecutor,
    answers: Vec<Answer>,
) -> Installer<RecordingExecutor, ScriptedPrompter> {
    Installer::new(
        exec,
        ScriptedPrompter::new(answers),
        InstallOptions::default(),
        InterruptFlag::new(),
    )
}

fn assert_in_order(exec: &RecordingExecutor, patterns: &[&str]) {
    let mut last = None;
    for pattern in patterns {
        let pos = exec
            .position(pattern)
            .unwrap_or_else(|| panic!("`{}` never ran:\n{:#?}", pattern, exec.lines()));
        if let Some((prev_pattern, prev)) = last {
            assert!(prev < pos, "`{}` ran before `{}`", pattern, prev_pattern);
        }
        last = Some((pattern, pos));
    }
}

#[test]
fn test_full_install_sata_amd_bspwm_grub_swap() {
    let mut exec = sata_host("AuthenticAMD");
    exec.add_file("/mnt/etc/default/grub", "GRUB_TIMEOUT=5\nGRUB_CMDLINE_LINUX_DEFAULT=\"loglevel=3 quiet\"\n")
        .add_file("/mnt/etc/locale.gen", "#en_US.UTF-8 UTF-8\n#de_DE.UTF-8 UTF-8\n");
    let mut installer = installer(exec, confirmed(sata_answers(), EXIT));

    let completion = installer.run().expect("install should succeed");
    assert!(!completion.reboot);
    assert_eq!(completion.settings.device, PathBuf::from("/dev/sdx"));
    assert!(installer.progress().is_complete());

    let exec = installer.executor();
    assert_in_order(
        exec,
        &[
            "umount -f /mnt/boot",
            "wipefs -a /dev/sdx",
            "sgdisk --zap-all /dev/sdx",
            "sgdisk -o /dev/sdx",
            "sgdisk -n 1:0:+1G -t 1:ef00 /dev/sdx",
            "sgdisk -n 2:0:0 -t 2:8300 /dev/sdx",
            "mkfs.fat -F 32 /dev/sdx1",
            "mkfs.ext4 -F /dev/sdx2",
            "mount /dev/sdx2 /mnt",
            "mkdir -p /mnt/boot",
            "mount /dev/sdx1 /mnt/boot",
            "reflector --latest 20 --protocol https --sort rate --save /etc/pacman.d/mirrorlist",
            "pacstrap -K /mnt",
            "genfstab -U /mnt",
            "arch-chroot /mnt mkswap -U clear --size 4G --file /swapfile",
            "arch-chroot /mnt ln -sf /usr/share/zoneinfo/UTC /etc/localtime",
            "arch-chroot /mnt hwclock --systohc",
            "arch-chroot /mnt locale-gen",
            "arch-chroot /mnt systemctl enable NetworkManager",
            "arch-chroot /mnt pacman -S --noconfirm --needed amd-ucode",
            "arch-chroot /mnt pacman -S --noconfirm --needed grub efibootmgr",
            "arch-chroot /mnt grub-install --target=x86_64-efi --efi-directory=/boot --bootloader-id=GRUB",
            "arch-chroot /mnt grub-mkconfig -o /boot/grub/grub.cfg",
            "arch-chroot /mnt chpasswd",
            "arch-chroot /mnt useradd -m -G wheel -s /bin/bash alice",
            "arch-chroot /mnt chown -R alice:alice /home/alice/.config",
        ],
    );

    assert!(exec.lines().iter().any(|l| l == "umount -f /mnt"));

    let lines = exec.lines();
    let pacstrap = &lines[exec.position("pacstrap").unwrap()];
    for package in [
        "base",
        "linux",
        "linux-headers",
        "networkmanager",
        "sudo",
        "bspwm",
        "sxhkd",
        "polybar",
        "xf86-video-amdgpu",
        "mesa",
    ] {
        assert!(pacstrap.split(' ').any(|p| p == package), "{} missing from {}", package, pacstrap);
    }

    assert!(!exec.ran("bootctl"));
    assert!(!exec.ran("systemctl enable gdm"));
    assert!(!exec.ran("systemctl enable sddm"));
    assert!(!exec.ran("reboot"));

    // Passwords only ever travel over stdin
    let payloads: Vec<&str> = exec
        .commands
        .iter()
        .filter_map(|c| c.stdin.as_ref().map(|s| s.expose()))
        .collect();
    assert_eq!(payloads, vec!["root:toor\n", "alice:hunter2\n"]);
    for line in exec.lines() {
        assert!(!line.contains("toor") && !line.contains("hunter2"), "{}", line);
    }

    let fstab = exec.file("/mnt/etc/fstab").unwrap();
    assert!(fstab.starts_with("UUID=abcd / ext4"));
    assert!(fstab.ends_with("/swapfile none swap defaults 0 0\n"));

    assert_eq!(exec.file("/mnt/etc/hostname"), Some("archlinux\n"));
    assert_eq!(
        exec.file("/mnt/etc/locale.gen"),
        Some("en_US.UTF-8 UTF-8\n#de_DE.UTF-8 UTF-8\n")
    );
    assert_eq!(
        exec.file("/mnt/etc/locale.conf"),
        Some("LANG=en_US.UTF-8\nLC_TIME=en_US.UTF-8\nLC_NUMERIC=en_US.UTF-8\nLC_MONETARY=en_US.UTF-8\n")
    );
    assert_eq!(
        exec.file("/mnt/home/alice/.config/locale.conf"),
        exec.file("/mnt/etc/locale.conf")
    );
    assert_eq!(exec.file("/mnt/etc/sudoers.d/10-wheel"), Some(SUDOERS_RULE));
    assert_eq!(
        exec.modes.get(&PathBuf::from("/mnt/etc/sudoers.d/10-wheel")),
        Some(&SUDOERS_MODE)
    );
    assert!(
        exec.file("/mnt/etc/default/grub")
            .unwrap()
            .contains("GRUB_CMDLINE_LINUX_DEFAULT=\"loglevel=3 quiet initrd=/amd-ucode.img\"")
    );

    // The summary shown at the gate masks both passwords
    let prompter = installer.prompter();
    let summary = &prompter.summaries[0];
    assert!(summary.contains(&("Root password".to_string(), "********".to_string())));
    assert!(summary.contains(&("User password".to_string(), "********".to_string())));
    assert!(summary.iter().all(|(_, v)| v != "toor" && v != "hunter2"));
    assert_eq!(prompter.remaining(), 0);
}

#[test]
fn test_full_install_nvme_intel_gnome_systemd_boot() {
    let mut exec = RecordingExecutor::new();
    exec.add_dir(EFI_FIRMWARE_DIR)
        .add_file(CPUINFO_PATH, "vendor_id\t: GenuineIntel\n")
        .respond("lsblk -n -r -o NAME,SIZE,TYPE", "nvme0n1 931.5G disk\n");
    let answers = vec![
        Answer::choice("/dev/nvme0n1 (931.5G)"),
        Answer::text("toor"),
        Answer::text("toor"),
        Answer::choice("No"),
        Answer::choice("linux-lts"),
        Answer::choice("nvidia"),
        Answer::choice("gnome"),
        Answer::choice("systemd-boot"),
        Answer::choice("No"),
        Answer::choice("de_DE.UTF-8"),
        Answer::Select(0),
        Answer::choice("en_US.UTF-8"),
        Answer::Select(0),
        Answer::Select(0),
        Answer::choice(INSTALL),
        Answer::choice(REBOOT_NOW),
    ];
    let options = InstallOptions {
        hostname: "workstation".into(),
        timezone: "Europe/Berlin".into(),
        skip_mirrors: true,
        ..InstallOptions::default()
    };
    let mut installer = Installer::new(exec, ScriptedPrompter::new(answers), options, InterruptFlag::new());

    let completion = installer.run().expect("install should succeed");
    assert!(completion.reboot);

    let exec = installer.executor();
    assert_in_order(
        exec,
        &[
            "mkfs.fat -F 32 /dev/nvme0n1p1",
            "mkfs.ext4 -F /dev/nvme0n1p2",
            "pacstrap -K /mnt",
            "arch-chroot /mnt ln -sf /usr/share/zoneinfo/Europe/Berlin /etc/localtime",
            "arch-chroot /mnt systemctl enable NetworkManager",
            "arch-chroot /mnt systemctl enable gdm",
            "arch-chroot /mnt pacman -S --noconfirm --needed intel-ucode",
            "arch-chroot /mnt bootctl --esp-path=/boot install",
            "arch-chroot /mnt chpasswd",
        ],
    );
    assert_eq!(exec.lines().last().map(String::as_str), Some("reboot"));
    assert!(!exec.ran("reflector"));
    assert!(!exec.ran("umount"));
    assert!(!exec.ran("mkswap"));
    assert!(!exec.ran("grub-install"));
    assert!(!exec.ran("useradd"));
    assert_eq!(exec.commands.iter().filter(|c| c.line.contains("chpasswd")).count(), 1);

    assert_eq!(exec.file("/mnt/etc/hostname"), Some("workstation\n"));
    assert_eq!(
        exec.file("/mnt/etc/locale.conf"),
        Some("LANG=de_DE.UTF-8\nLC_TIME=en_US.UTF-8\nLC_NUMERIC=de_DE.UTF-8\nLC_MONETARY=de_DE.UTF-8\n")
    );
    let locale_gen = exec.file("/mnt/etc/locale.gen").unwrap();
    assert!(locale_gen.contains("de_DE.UTF-8 UTF-8"));
    assert!(locale_gen.contains("en_US.UTF-8 UTF-8"));

    assert_eq!(
        exec.file("/mnt/boot/loader/loader.conf"),
        Some(miniarch::bootloader::LOADER_CONF)
    );
    let entry = exec.file("/mnt/boot/loader/entries/arch.conf").unwrap();
    assert_eq!(
        entry,
        "title   Arch Linux (linux-lts)\n\
         linux   /vmlinuz-linux-lts\n\
         initrd  /intel-ucode.img\n\
         initrd  /initramfs-linux-lts.img\n\
         options root=/dev/nvme0n1p2 rw quiet nvidia_drm.modeset=1\n"
    );
    let fallback = exec.file("/mnt/boot/loader/entries/arch-fallback.conf").unwrap();
    assert!(fallback.contains("initrd  /initramfs-linux-lts-fallback.img\n"));
    assert!(fallback.contains("initrd  /intel-ucode.img\n"));
}

#[test]
fn test_cancel_at_confirmation_has_no_side_effects() {
    let mut answers = sata_answers();
    answers.push(Answer::choice(CANCEL));
    let mut installer = installer(sata_host("AuthenticAMD"), answers);

    let err = installer.run().unwrap_err();
    assert!(matches!(err, InstallError::Cancelled));
    assert_eq!(err.exit_code(), 130);

    let exec = installer.executor();
    assert!(exec.commands.iter().all(|c| c.side_effect == SideEffect::ReadOnly));
    for tool in ["umount", "wipefs", "sgdisk", "mkfs", "mount /dev", "pacstrap", "chpasswd"] {
        assert!(!exec.ran(tool), "{} ran after cancel", tool);
    }
    assert!(exec.files.keys().all(|p| p == &PathBuf::from(CPUINFO_PATH)));
    assert_eq!(installer.progress().current_stage(), InstallStage::NotStarted);
}

#[test]
fn test_escape_at_confirmation_cancels() {
    let mut answers = sata_answers();
    answers.push(Answer::Cancel);
    let mut installer = installer(sata_host("AuthenticAMD"), answers);

    assert!(installer.run().unwrap_err().is_cancelled());
    assert!(!installer.executor().ran("wipefs"));
}

#[test]
fn test_failing_pacstrap_aborts_remaining_steps() {
    let mut exec = sata_host("GenuineIntel");
    exec.fail_on("pacstrap", "error: failed retrieving file 'linux.pkg.tar.zst'");
    let mut installer = installer(exec, confirmed(sata_answers(), EXIT));

    let err = installer.run().unwrap_err();
    match &err {
        InstallError::CommandFailed { command, exit_code, stderr } => {
            assert!(command.starts_with("pacstrap -K /mnt"));
            assert_eq!(*exit_code, Some(1));
            assert!(stderr.contains("failed retrieving"));
        }
        other => panic!("Expected CommandFailed, got {:?}", other),
    }

    assert_eq!(installer.progress().current_stage(), InstallStage::Failed);
    assert_eq!(installer.progress().failed_at(), Some(InstallStage::InstallingBase));
    let exec = installer.executor();
    assert_eq!(exec.lines().last().map(|l| l.starts_with("pacstrap")), Some(true));
    assert!(!exec.ran("genfstab"));
    assert!(!exec.ran("arch-chroot"));
    assert!(!exec.files.contains_key(&PathBuf::from("/mnt/etc/fstab")));
}

#[test]
fn test_failing_format_leaves_device_indeterminate() {
    let mut exec = sata_host("GenuineIntel");
    exec.fail_on("mkfs.ext4", "mkfs.ext4: Device size reported to be zero");
    let mut installer = installer(exec, confirmed(sata_answers(), EXIT));

    let err = installer.run().unwrap_err();
    match &err {
        InstallError::DeviceIndeterminate { device, source } => {
            assert_eq!(device, &PathBuf::from("/dev/sdx"));
            assert!(matches!(**source, InstallError::CommandFailed { .. }));
        }
        other => panic!("Expected DeviceIndeterminate, got {:?}", other),
    }
    assert_eq!(err.stderr(), Some("mkfs.ext4: Device size reported to be zero"));
    assert_eq!(installer.progress().failed_at(), Some(InstallStage::Partitioning));
    assert!(!installer.executor().ran("mount /dev/sdx2"));
    assert!(!installer.executor().ran("reflector"));
}

#[test]
fn test_disk_listing_is_idempotent_across_cancelled_run() {
    let mut exec = sata_host("AuthenticAMD");
    let inspector = DiskInspector::new();
    let before = inspector.list_disks(&mut exec).unwrap();

    let mut answers = sata_answers();
    answers.push(Answer::choice(CANCEL));
    let mut installer = installer(exec, answers);
    assert!(installer.run().unwrap_err().is_cancelled());

    let mut exec = installer.executor().clone();
    let after = DiskInspector::new().list_disks(&mut exec).unwrap();
    let again = inspector.list_disks(&mut exec).unwrap();
    assert_eq!(before, after);
    assert_eq!(before, again);
    assert_eq!(before.len(), 1);
    assert!(!exec.is_dry_run());
}

#[test]
fn test_failed_run_does_not_reuse_secrets() {
    let mut exec = sata_host("AuthenticAMD");
    exec.fail_on("useradd", "useradd: user 'alice' already exists");
    let mut installer = installer(exec, confirmed(sata_answers(), EXIT));

    let err = installer.run().unwrap_err();
    assert!(matches!(err, InstallError::CommandFailed { .. }));
    assert_eq!(installer.progress().failed_at(), Some(InstallStage::ProvisioningAccounts));
    // Root password went out, the user's never did
    let exec = installer.executor();
    assert_eq!(exec.commands.iter().filter(|c| c.stdin.is_some()).count(), 1);
}
