// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nix::unistd::{Gid, Uid};
use std::os::unix::fs::FileTypeExt;

fn work_dir() -> WorkDir {
    WorkDir::new(Uid::current(), Gid::current()).unwrap()
}

#[test]
fn creates_a_private_directory() {
    let dir = work_dir();
    assert!(dir.path().is_dir());
    let mode = fs::metadata(dir.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
    let name = dir.path().file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("roost.spawn."));
}

#[test]
fn two_work_dirs_never_collide() {
    let a = work_dir();
    let b = work_dir();
    assert_ne!(a.path(), b.path());
}

#[test]
fn subdirs_are_private_too() {
    let dir = work_dir();
    let sub = dir.make_subdir("response/steps").unwrap();
    assert!(sub.is_dir());
    let mode = fs::metadata(&sub).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
}

#[test]
fn fifo_is_a_fifo_with_owner_only_access() {
    let dir = work_dir();
    dir.make_subdir("response").unwrap();
    let fifo = dir.make_fifo("response/finish").unwrap();
    let metadata = fs::metadata(&fifo).unwrap();
    assert!(metadata.file_type().is_fifo());
    assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
}

#[test]
fn files_are_written_with_owner_only_access() {
    let dir = work_dir();
    let file = dir.write_file("args.json", "{}").unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), "{}");
    assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o600);
}

#[test]
fn dropping_removes_everything() {
    let dir = work_dir();
    let path = dir.path().to_path_buf();
    dir.make_subdir("response").unwrap();
    dir.make_fifo("response/finish").unwrap();
    dir.write_file("args.json", "{}").unwrap();
    drop(dir);
    assert!(!path.exists());
}
