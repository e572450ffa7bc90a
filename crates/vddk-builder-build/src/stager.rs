//! アップロードされた tar.gz をビルドコンテキストとして展開

use crate::error::ExtractionError;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

/// 展開結果の集計
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub directories: usize,
    pub files: usize,
    pub skipped: usize,
}

pub struct ArchiveStager;

impl ArchiveStager {
    /// tar.gz アーカイブを `dest` 配下に展開
    ///
    /// ディレクトリと通常ファイルのみ展開し、シンボリックリンクやデバイス
    /// ファイルなどは黙ってスキップする。`..` や絶対パスを含むエントリは
    /// `dest` の外に書き込めてしまうため拒否する。
    ///
    /// 失敗時に途中まで展開したファイルは残る。削除は呼び出し側の責務。
    pub fn extract(archive_path: &Path, dest: &Path) -> Result<ExtractSummary, ExtractionError> {
        tracing::debug!(
            "Extracting {} into {}",
            archive_path.display(),
            dest.display()
        );

        let file = File::open(archive_path).map_err(|source| ExtractionError::Open {
            path: archive_path.to_path_buf(),
            source,
        })?;

        let mut archive = Archive::new(GzDecoder::new(file));
        let mut summary = ExtractSummary::default();

        for entry in archive.entries().map_err(ExtractionError::Read)? {
            let mut entry = entry.map_err(ExtractionError::Read)?;
            let entry_path = entry.path().map_err(ExtractionError::Read)?.into_owned();
            let target = Self::resolve_target(dest, &entry_path)?;
            let entry_type = entry.header().entry_type();

            match entry_type {
                EntryType::Directory => {
                    fs::create_dir_all(&target).map_err(|source| ExtractionError::CreateDir {
                        path: target.clone(),
                        source,
                    })?;
                    summary.directories += 1;
                }
                EntryType::Regular => {
                    if target == dest {
                        return Err(ExtractionError::UnsafePath(entry_path));
                    }
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent).map_err(|source| {
                            ExtractionError::CreateDir {
                                path: parent.to_path_buf(),
                                source,
                            }
                        })?;
                    }

                    let mode = entry.header().mode().ok();
                    Self::write_file(&mut entry, &target, mode)?;
                    summary.files += 1;
                }
                other => {
                    tracing::debug!(
                        "Skipping unsupported entry {} ({:?})",
                        entry_path.display(),
                        other
                    );
                    summary.skipped += 1;
                }
            }
        }

        tracing::debug!(
            "Extracted {} files and {} directories ({} skipped)",
            summary.files,
            summary.directories,
            summary.skipped
        );

        Ok(summary)
    }

    /// エントリ名を `dest` 配下のパスに解決する
    ///
    /// `.` は無視し、`..`・ルート・プレフィックスを含む名前は拒否する。
    fn resolve_target(dest: &Path, entry_path: &Path) -> Result<PathBuf, ExtractionError> {
        let mut target = dest.to_path_buf();

        for component in entry_path.components() {
            match component {
                Component::Normal(part) => target.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(ExtractionError::UnsafePath(entry_path.to_path_buf()));
                }
            }
        }

        Ok(target)
    }

    fn write_file(
        reader: &mut impl io::Read,
        target: &Path,
        mode: Option<u32>,
    ) -> Result<(), ExtractionError> {
        let write_err = |source| ExtractionError::WriteFile {
            path: target.to_path_buf(),
            source,
        };

        let mut out = File::create(target).map_err(write_err)?;
        io::copy(reader, &mut out).map_err(write_err)?;

        if let Some(mode) = mode {
            set_mode(target, mode).map_err(write_err)?;
        }

        Ok(())
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
