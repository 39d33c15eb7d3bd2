//! File transfer into a container
//!
//! Content is packed into a single-entry tar archive in memory and extracted
//! by the container runtime directly into the target directory. This keeps
//! arbitrary bytes intact; streaming content through shell-quoted `echo` is
//! not binary-safe and breaks on quote-heavy sources.

use bollard::query_parameters::UploadToContainerOptions;
use bollard::Docker;
use std::path::Path;
use std::time::Duration;

use crate::errors::SandboxError;
use crate::exec;

/// Pack `content` as a one-entry tar archive named `name`.
pub fn pack_archive(name: &str, content: &[u8]) -> Result<Vec<u8>, SandboxError> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    builder
        .append_data(&mut header, name, content)
        .map_err(|e| SandboxError::IoError(format!("failed to pack archive: {}", e)))?;
    builder
        .into_inner()
        .map_err(|e| SandboxError::IoError(format!("failed to finish archive: {}", e)))
}

/// Place `content` at `work_dir/filename` inside the container, creating
/// intermediate directories first when the path has a directory component.
/// Writing the same filename twice replaces the content.
pub async fn put(
    docker: &Docker,
    container_id: &str,
    work_dir: &str,
    filename: &str,
    content: &[u8],
    timeout: Duration,
) -> Result<(), SandboxError> {
    let path = Path::new(filename);
    let basename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SandboxError::WriteFailed {
            filename: filename.to_string(),
            message: "invalid filename".to_string(),
        })?;

    let mut extract_dir = work_dir.to_string();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        extract_dir = format!("{}/{}", work_dir, parent.display());
        let mkdir = format!("mkdir -p '{}'", extract_dir);
        let result = exec::run_shell(docker, container_id, &mkdir, work_dir, timeout)
            .await
            .map_err(|e| SandboxError::WriteFailed {
                filename: filename.to_string(),
                message: e.to_string(),
            })?;
        if result.exit_code != 0 {
            return Err(SandboxError::WriteFailed {
                filename: filename.to_string(),
                message: format!("failed to create parent directory: {}", result.stderr),
            });
        }
    }

    let archive = pack_archive(basename, content)?;
    docker
        .upload_to_container(
            container_id,
            Some(UploadToContainerOptions {
                path: extract_dir,
                ..Default::default()
            }),
            bollard::body_full(archive.into()),
        )
        .await
        .map_err(|e| SandboxError::WriteFailed {
            filename: filename.to_string(),
            message: e.to_string(),
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unpack_single(archive: &[u8]) -> (String, Vec<u8>) {
        let mut reader = tar::Archive::new(archive);
        let mut entries = reader.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let mut content = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut content).unwrap();
        assert!(entries.next().is_none(), "expected a single entry");
        (name, content)
    }

    #[test]
    fn archive_round_trips_content_byte_for_byte() {
        let content = "print(\"héllo wörld\")\nprint('quotes \" and \\' mix')\n";
        let archive = pack_archive("program.py", content.as_bytes()).unwrap();
        let (name, unpacked) = unpack_single(&archive);
        assert_eq!(name, "program.py");
        assert_eq!(unpacked, content.as_bytes());
    }

    #[test]
    fn archive_preserves_binary_content() {
        let content: Vec<u8> = (0u8..=255).collect();
        let archive = pack_archive("blob.bin", &content).unwrap();
        let (_, unpacked) = unpack_single(&archive);
        assert_eq!(unpacked, content);
    }

    #[test]
    fn archive_entry_is_a_regular_file_with_sane_mode() {
        let archive = pack_archive("program.py", b"pass\n").unwrap();
        let mut reader = tar::Archive::new(archive.as_slice());
        let entry = reader.entries().unwrap().next().unwrap().unwrap();
        let header = entry.header();
        assert_eq!(header.entry_type(), tar::EntryType::Regular);
        assert_eq!(header.mode().unwrap() & 0o777, 0o644);
        assert_eq!(header.size().unwrap(), 5);
    }
}
