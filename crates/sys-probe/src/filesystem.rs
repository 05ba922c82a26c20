use std::{
	fs,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Filesystem types on which inotify misses remote or userspace changes
pub const INCOMPATIBLE_FILESYSTEMS: &[&str] = &[
	"nfs", "nfs4", "cifs", "smbfs", "smb3", "sshfs", "fuse", "9p", "vboxsf",
];

const MOUNTS_PATH: &str = "/proc/self/mounts";

/// One line of a mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
	pub device: String,
	pub mount_point: PathBuf,
	pub fs_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemInfo {
	pub path: PathBuf,
	pub mount_point: PathBuf,
	pub fs_type: String,
	pub total_bytes: u64,
	pub free_bytes: u64,
	pub available_bytes: u64,
	pub inodes_total: u64,
	pub inodes_free: u64,
	pub max_filename_length: u64,
}

impl FilesystemInfo {
	pub fn probe(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let path = fs::canonicalize(path).map_err(|e| Error::read(path, e))?;

		let mounts = fs::read_to_string(MOUNTS_PATH).map_err(|e| Error::read(MOUNTS_PATH, e))?;
		let mount = mount_for(&parse_mounts(&mounts), &path)
			.cloned()
			.ok_or_else(|| Error::MountNotFound(path.as_path().into()))?;

		let stats = statvfs(&path)?;

		debug!(
			path = %path.display(),
			fs_type = %mount.fs_type,
			mount_point = %mount.mount_point.display(),
			"Probed filesystem;"
		);

		Ok(Self {
			path,
			mount_point: mount.mount_point,
			fs_type: mount.fs_type,
			total_bytes: stats.total_bytes,
			free_bytes: stats.free_bytes,
			available_bytes: stats.available_bytes,
			inodes_total: stats.inodes_total,
			inodes_free: stats.inodes_free,
			max_filename_length: stats.max_filename_length,
		})
	}

	/// Whether kernel watches on this filesystem see every change
	#[must_use]
	pub fn is_watch_compatible(&self) -> bool {
		is_watch_compatible(&self.fs_type)
	}
}

pub(crate) fn is_watch_compatible(fs_type: &str) -> bool {
	// fuse mounts show up as `fuse.<driver>`
	let base = fs_type.split('.').next().unwrap_or(fs_type);
	!INCOMPATIBLE_FILESYSTEMS.contains(&fs_type) && !INCOMPATIBLE_FILESYSTEMS.contains(&base)
}

/// Parses a `/proc/<pid>/mounts` table, skipping malformed lines
#[must_use]
pub fn parse_mounts(table: &str) -> Vec<MountEntry> {
	table
		.lines()
		.filter_map(|line| {
			let mut fields = line.split_whitespace();
			let device = fields.next()?;
			let mount_point = fields.next()?;
			let fs_type = fields.next()?;

			Some(MountEntry {
				device: unescape(device),
				mount_point: PathBuf::from(unescape(mount_point)),
				fs_type: fs_type.to_string(),
			})
		})
		.collect()
}

/// The deepest mount containing `path`
fn mount_for<'a>(mounts: &'a [MountEntry], path: &Path) -> Option<&'a MountEntry> {
	// On ties `max_by_key` keeps the last entry, matching how later mounts shadow earlier ones
	mounts
		.iter()
		.filter(|mount| path.starts_with(&mount.mount_point))
		.max_by_key(|mount| mount.mount_point.components().count())
}

/// Undoes the kernel's octal escaping of spaces, tabs, newlines and backslashes
fn unescape(field: &str) -> String {
	let bytes = field.as_bytes();
	let mut out = Vec::with_capacity(bytes.len());
	let mut i = 0;

	while i < bytes.len() {
		if bytes[i] == b'\\' {
			let escaped = bytes
				.get(i + 1..i + 4)
				.and_then(|digits| std::str::from_utf8(digits).ok())
				.and_then(|digits| u8::from_str_radix(digits, 8).ok());

			if let Some(value) = escaped {
				out.push(value);
				i += 4;
				continue;
			}
		}

		out.push(bytes[i]);
		i += 1;
	}

	String::from_utf8_lossy(&out).into_owned()
}

struct Stats {
	total_bytes: u64,
	free_bytes: u64,
	available_bytes: u64,
	inodes_total: u64,
	inodes_free: u64,
	max_filename_length: u64,
}

#[cfg(unix)]
fn statvfs(path: &Path) -> Result<Stats> {
	use std::{ffi::CString, io, mem::MaybeUninit, os::unix::ffi::OsStrExt};

	let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| Error::Statvfs {
		path: path.into(),
		source: io::Error::new(io::ErrorKind::InvalidInput, e),
	})?;

	let mut stats = MaybeUninit::<libc::statvfs>::uninit();

	// SAFETY: `c_path` is a valid NUL-terminated string and `stats` points to writable
	// memory of the right size; the struct is only read when the call succeeds
	let stats = unsafe {
		if libc::statvfs(c_path.as_ptr(), stats.as_mut_ptr()) != 0 {
			return Err(Error::Statvfs {
				path: path.into(),
				source: io::Error::last_os_error(),
			});
		}
		stats.assume_init()
	};

	let fragment = u64::from(stats.f_frsize);

	Ok(Stats {
		total_bytes: u64::from(stats.f_blocks).saturating_mul(fragment),
		free_bytes: u64::from(stats.f_bfree).saturating_mul(fragment),
		available_bytes: u64::from(stats.f_bavail).saturating_mul(fragment),
		inodes_total: u64::from(stats.f_files),
		inodes_free: u64::from(stats.f_ffree),
		max_filename_length: u64::from(stats.f_namemax),
	})
}

#[cfg(not(unix))]
fn statvfs(_path: &Path) -> Result<Stats> {
	Err(Error::Unsupported)
}
