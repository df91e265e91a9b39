//! Ownership classification: does a process belong to a container or a VM?
//!
//! Container identity is parsed from `/proc/<pid>/cgroup` using the naming
//! conventions of the common runtimes (systemd scopes such as
//! `docker-<id>.scope`, `cri-containerd-<id>.scope`, `crio-<id>.scope`,
//! `libpod-<id>.scope`, and the cgroupfs driver's bare-id layout). VM
//! identity is inferred from well-known hypervisor executables and their
//! command lines. The two lookups touch different subsystems and are
//! independent; the informer issues them concurrently and joins the results.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::types::{
    ContainerID, ContainerInfo, ContainerRuntime, Hypervisor, Pid, PodID, VmID, VmInfo,
};

/// Side-effect-free classification calls consumed by the informer.
///
/// Either lookup returning `Ok(None)` means "definitely not one of mine";
/// an error means the subsystem could not be consulted and classification
/// should be retried.
pub trait OwnershipLookup: Send + Sync {
    fn container_of(&self, pid: Pid) -> io::Result<Option<ContainerInfo>>;
    fn vm_of(&self, pid: Pid) -> io::Result<Option<VmInfo>>;
}

/// Oracle for the set of containers the runtime still considers alive.
/// Consulted only when the collector's inactive-container threshold is
/// exceeded, so a full scan per call is acceptable.
pub trait ContainerLiveness: Send + Sync {
    fn live_containers(&self) -> io::Result<HashSet<ContainerID>>;
}

const CONTAINER_ID_LEN: usize = 64;

fn is_lowercase_hex(src: &str) -> bool {
    src.bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Matches one cgroup path segment against the systemd scope conventions of
/// the known runtimes.
fn container_from_scope(segment: &str) -> Option<(ContainerID, ContainerRuntime)> {
    let scope = segment.strip_suffix(".scope")?;
    let (id, runtime) = if let Some(id) = scope.strip_prefix("docker-") {
        (id, ContainerRuntime::Docker)
    } else if let Some(id) = scope.strip_prefix("cri-containerd-") {
        (id, ContainerRuntime::Containerd)
    } else if let Some(id) = scope.strip_prefix("crio-") {
        (id, ContainerRuntime::Crio)
    } else if let Some(id) = scope.strip_prefix("libpod-") {
        (id, ContainerRuntime::Podman)
    } else {
        return None;
    };

    if id.len() != CONTAINER_ID_LEN || !is_lowercase_hex(id) {
        return None;
    }

    ContainerID::new(id).ok().map(|id| (id, runtime))
}

/// Matches the cgroupfs driver layout where the id is a bare path segment
/// under a runtime directory (`/docker/<id>`, `/kubepods/.../<id>`).
fn container_from_bare_segment(
    parent: &str,
    segment: &str,
) -> Option<(ContainerID, ContainerRuntime)> {
    if segment.len() != CONTAINER_ID_LEN || !is_lowercase_hex(segment) {
        return None;
    }

    let runtime = match parent {
        "docker" => ContainerRuntime::Docker,
        p if p.starts_with("pod") || p.starts_with("kubepods") => ContainerRuntime::Unknown,
        _ => return None,
    };

    ContainerID::new(segment).ok().map(|id| (id, runtime))
}

/// Extracts a pod UID from a kubepods slice or directory segment.
///
/// systemd driver: `kubepods-burstable-pod2b4e..._...slice` (UID with `_`
/// in place of `-`); cgroupfs driver: plain `pod2b4e...-...` directories.
fn pod_id_from_segment(segment: &str) -> Option<PodID> {
    let raw = if let Some(slice) = segment.strip_suffix(".slice") {
        let pod = slice.rsplit('-').next()?;
        pod.strip_prefix("pod")?.replace('_', "-")
    } else {
        segment.strip_prefix("pod")?.to_owned()
    };

    // kubernetes UIDs are 36-char dashed UUIDs
    if raw.len() != 36 {
        return None;
    }

    PodID::new(raw).ok()
}

/// Scans a full cgroup path for container and pod identity.
pub fn parse_cgroup_path(path: &str) -> Option<ContainerInfo> {
    let mut pod_id = None;
    let mut prev = "";
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if let Some(pod) = pod_id_from_segment(segment) {
            pod_id = Some(pod);
            prev = segment;
            continue;
        }

        let found = container_from_scope(segment)
            .or_else(|| container_from_bare_segment(prev, segment));
        if let Some((id, runtime)) = found {
            let name = id.short().to_owned();
            return Some(ContainerInfo {
                id,
                name,
                runtime,
                cgroup_path: path.to_owned(),
                pod_id,
            });
        }

        prev = segment;
    }

    None
}

/// Default [`OwnershipLookup`] reading classification facts from procfs.
#[derive(Debug)]
pub struct ProcfsOwnershipLookup {
    procfs_root: PathBuf,
}

impl ProcfsOwnershipLookup {
    pub fn new(procfs_root: impl AsRef<Path>) -> Self {
        Self {
            procfs_root: procfs_root.as_ref().to_path_buf(),
        }
    }

    fn proc_path(&self, pid: Pid) -> PathBuf {
        self.procfs_root.join(pid.to_string())
    }
}

impl OwnershipLookup for ProcfsOwnershipLookup {
    fn container_of(&self, pid: Pid) -> io::Result<Option<ContainerInfo>> {
        let raw = fs::read_to_string(self.proc_path(pid).join("cgroup"))?;
        // lines are `<hierarchy>:<controllers>:<path>`; with cgroup v2 there
        // is a single `0::<path>` line, with v1 any controller line carries
        // the same container identity
        for line in raw.lines() {
            let Some(path) = line.splitn(3, ':').nth(2) else {
                continue;
            };
            if let Some(info) = parse_cgroup_path(path) {
                return Ok(Some(info));
            }
        }

        Ok(None)
    }

    fn vm_of(&self, pid: Pid) -> io::Result<Option<VmInfo>> {
        let proc_path = self.proc_path(pid);
        let comm = fs::read_to_string(proc_path.join("comm"))?;
        let comm = comm.trim_end();

        let hypervisor = if comm.starts_with("qemu-system") || comm == "qemu-kvm" {
            Hypervisor::Qemu
        } else if comm == "cloud-hypervisor" {
            Hypervisor::CloudHypervisor
        } else if comm == "firecracker" {
            Hypervisor::Firecracker
        } else {
            return Ok(None);
        };

        let raw = fs::read(proc_path.join("cmdline"))?;
        let args: Vec<String> = raw
            .split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect();

        Ok(Some(vm_identity(pid, hypervisor, comm, &args)?))
    }
}

/// Derives a stable VM identity from the hypervisor command line.
fn vm_identity(
    pid: Pid,
    hypervisor: Hypervisor,
    comm: &str,
    args: &[String],
) -> io::Result<VmInfo> {
    let mut name = None;
    let mut uuid = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match (hypervisor, arg.as_str()) {
            (Hypervisor::Qemu, "-name") => {
                if let Some(value) = iter.next() {
                    // `-name guest=foo,debug-threads=on` or plain `-name foo`
                    let guest = value
                        .split(',')
                        .find_map(|part| part.strip_prefix("guest="))
                        .unwrap_or_else(|| value.split(',').next().unwrap_or(value));
                    name = Some(guest.to_owned());
                }
            }
            (Hypervisor::Qemu, "-uuid") => {
                uuid = iter.next().cloned();
            }
            (Hypervisor::Firecracker, "--id") => {
                uuid = iter.next().cloned();
            }
            _ => {}
        }
    }

    let name = name.unwrap_or_else(|| comm.to_owned());
    let id = match uuid {
        Some(uuid) => uuid,
        // hypervisors launched without an explicit id are identified by
        // their process for as long as it lives
        None => format!("{}-{pid}", hypervisor.as_str()),
    };

    let id = VmID::new(&id)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    Ok(VmInfo {
        id,
        name,
        hypervisor,
    })
}

/// [`ContainerLiveness`] oracle backed by a scan of the cgroup v2 tree.
///
/// Walks the hierarchy iteratively and collects every directory whose name
/// matches a known container scope convention.
#[derive(Debug)]
pub struct CgroupLiveContainers {
    cgroup_root: PathBuf,
}

impl CgroupLiveContainers {
    pub fn new(cgroup_root: impl AsRef<Path>) -> Self {
        Self {
            cgroup_root: cgroup_root.as_ref().to_path_buf(),
        }
    }
}

impl ContainerLiveness for CgroupLiveContainers {
    fn live_containers(&self) -> io::Result<HashSet<ContainerID>> {
        let mut live = HashSet::new();
        let mut stack = VecDeque::new();
        stack.push_back(self.cgroup_root.clone());

        while let Some(dir) = stack.pop_back() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }

                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };

                if let Some((id, _)) = container_from_scope(name) {
                    live.insert(id);
                    continue;
                }

                stack.push_back(entry.path());
            }
        }

        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ID: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_parse_docker_systemd_scope() {
        let path = format!("/system.slice/docker-{ID}.scope");
        let info = parse_cgroup_path(&path).unwrap();
        assert_eq!(info.id.as_ref(), ID);
        assert_eq!(info.runtime, ContainerRuntime::Docker);
        assert_eq!(info.name, &ID[..12]);
        assert!(info.pod_id.is_none());
    }

    #[test]
    fn test_parse_kubepods_containerd_scope_with_pod() {
        let path = format!(
            "/kubepods.slice/kubepods-burstable.slice/\
             kubepods-burstable-pod2b4e3d4f_1111_2222_3333_444455556666.slice/\
             cri-containerd-{ID}.scope"
        );
        let info = parse_cgroup_path(&path).unwrap();
        assert_eq!(info.runtime, ContainerRuntime::Containerd);
        assert_eq!(
            info.pod_id.unwrap().as_ref(),
            "2b4e3d4f-1111-2222-3333-444455556666"
        );
    }

    #[test]
    fn test_parse_cgroupfs_driver_layout() {
        let path = format!("/docker/{ID}");
        let info = parse_cgroup_path(&path).unwrap();
        assert_eq!(info.runtime, ContainerRuntime::Docker);

        let path = format!("/kubepods/besteffort/pod2b4e3d4f-1111-2222-3333-444455556666/{ID}");
        let info = parse_cgroup_path(&path).unwrap();
        assert_eq!(info.runtime, ContainerRuntime::Unknown);
        assert!(info.pod_id.is_some());
    }

    #[test]
    fn test_parse_rejects_non_container_paths() {
        assert!(parse_cgroup_path("/system.slice/sshd.service").is_none());
        assert!(parse_cgroup_path("/user.slice/user-1000.slice").is_none());
        // right shape, wrong id length
        assert!(parse_cgroup_path("/system.slice/docker-abc123.scope").is_none());
        // uppercase hex is not a runtime id
        let upper = ID.to_uppercase();
        assert!(parse_cgroup_path(&format!("/system.slice/docker-{upper}.scope")).is_none());
    }

    #[test]
    fn test_vm_identity_qemu_guest_name_and_uuid() {
        let args: Vec<String> = [
            "qemu-system-x86_64",
            "-name",
            "guest=web-vm,debug-threads=on",
            "-uuid",
            "c0ffee00-dead-beef-0000-000000000001",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let info = vm_identity(100, Hypervisor::Qemu, "qemu-system-x86", &args).unwrap();
        assert_eq!(info.name, "web-vm");
        assert_eq!(info.id.as_ref(), "c0ffee00-dead-beef-0000-000000000001");
    }

    #[test]
    fn test_vm_identity_falls_back_to_pid() {
        let args = vec!["firecracker".to_string()];
        let info = vm_identity(77, Hypervisor::Firecracker, "firecracker", &args).unwrap();
        assert_eq!(info.id.as_ref(), "firecracker-77");
        assert_eq!(info.name, "firecracker");
    }

    #[test]
    fn test_procfs_lookup_classifies_container() {
        let tmp = tempfile::tempdir().unwrap();
        let proc_dir = tmp.path().join("123");
        fs::create_dir(&proc_dir).unwrap();
        fs::write(
            proc_dir.join("cgroup"),
            format!("0::/system.slice/docker-{ID}.scope\n"),
        )
        .unwrap();

        let lookup = ProcfsOwnershipLookup::new(tmp.path());
        let info = lookup.container_of(123).unwrap().unwrap();
        assert_eq!(info.id.as_ref(), ID);
    }

    #[test]
    fn test_procfs_lookup_regular_process() {
        let tmp = tempfile::tempdir().unwrap();
        let proc_dir = tmp.path().join("9");
        fs::create_dir(&proc_dir).unwrap();
        fs::write(proc_dir.join("cgroup"), "0::/user.slice/session-1.scope\n").unwrap();
        fs::write(proc_dir.join("comm"), "bash\n").unwrap();
        fs::write(proc_dir.join("cmdline"), b"bash\0").unwrap();

        let lookup = ProcfsOwnershipLookup::new(tmp.path());
        assert!(lookup.container_of(9).unwrap().is_none());
        assert!(lookup.vm_of(9).unwrap().is_none());
    }

    #[test]
    fn test_cgroup_live_container_scan() {
        let tmp = tempfile::tempdir().unwrap();
        let slice = tmp.path().join("system.slice");
        fs::create_dir(&slice).unwrap();
        fs::create_dir(slice.join(format!("docker-{ID}.scope"))).unwrap();
        fs::create_dir(slice.join("sshd.service")).unwrap();
        fs::create_dir(tmp.path().join("user.slice")).unwrap();

        let oracle = CgroupLiveContainers::new(tmp.path());
        let live = oracle.live_containers().unwrap();
        assert_eq!(live.len(), 1);
        assert!(live.contains(ID));
    }
}
