//! # Bluetooth RFCOMM Transport (BlueZ)
//!
//! This module talks to paired Bluetooth printers through the Linux BlueZ
//! stack using the Serial Port Profile (SPP) over RFCOMM.
//!
//! ## How It Maps To The Capability Interface
//!
//! | Operation | Mechanism |
//! |-----------|-----------|
//! | adapter status | `bluetoothctl show` |
//! | paired devices | `bluetoothctl devices Paired` (or `paired-devices` on older BlueZ) |
//! | SPP channel | `sdptool search --bdaddr <MAC> 0x1101`, default channel 1 |
//! | open | existing `/dev/rfcommN` binding, else `rfcomm bind`, then open the TTY |
//! | close | drop the TTY; release bindings this adapter created |
//!
//! ## Bluetooth Setup (Linux)
//!
//! The printer must already be paired:
//!
//! ```bash
//! $ bluetoothctl
//! [bluetooth]# scan on
//! # Look for "XP-P800"
//! [bluetooth]# pair 00:11:62:XX:XX:XX
//! ```
//!
//! Binding the RFCOMM device needs root (or `CAP_NET_ADMIN`). A binding made
//! beforehand with `sudo rfcomm bind 0 <MAC>` is picked up automatically.
//!
//! ## TTY Configuration
//!
//! The RFCOMM device is opened in raw mode to ensure binary data is
//! transmitted without modification:
//!
//! - **No input processing**: Disable IGNBRK, BRKINT, PARMRK, ISTRIP, etc.
//! - **No output processing**: Disable OPOST (no CR/LF translation)
//! - **8-bit characters**: CS8 (8 data bits, no parity)
//! - **No echo**: Disable ECHO, ECHONL
//! - **Non-canonical mode**: Disable ICANON (no line buffering)
//!
//! ## Timeouts
//!
//! Every helper command is killed after [`COMMAND_TIMEOUT`], so a missing
//! `bluetoothd` reads as an unavailable adapter instead of a hang. Inside
//! `open`, the connect, ping, bind and TTY open steps all draw on the one
//! connect timeout.
//!
//! Opening an RFCOMM TTY blocks until the radio link is up, which can take
//! as long as a pairing prompt. The open runs on a helper thread and is
//! abandoned once the budget runs out. The TTY is then switched to
//! non-blocking mode; writes take what fits and wait with `poll(2)` for
//! the remaining send time when nothing does.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{AdapterStatus, DeviceHandle, SERIAL_PORT_PROFILE, SerialAdapter, SerialLink};

/// RFCOMM channel used when SDP lookup fails (standard for SPP).
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Upper bound on any single BlueZ helper command
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause that lets a fresh binding or ACL link settle (milliseconds)
const SETTLE_DELAY_MS: u64 = 500;

// ============================================================================
// ADAPTER
// ============================================================================

/// # BlueZ Adapter
///
/// ## Example
///
/// ```no_run
/// use snapprint::transport::{BluezAdapter, PrinterTransport, TransportSettings};
///
/// let transport = PrinterTransport::new(BluezAdapter::new(0), TransportSettings::default());
/// let printer = transport.discover("XP-P800")?;
/// println!("found {}", printer);
/// # Ok::<(), snapprint::PrintError>(())
/// ```
#[derive(Debug, Clone)]
pub struct BluezAdapter {
    /// `N` in `/dev/rfcommN` when a new binding is needed
    rfcomm_device: u8,
}

impl Default for BluezAdapter {
    fn default() -> Self {
        Self::new(0)
    }
}

impl BluezAdapter {
    pub fn new(rfcomm_device: u8) -> Self {
        Self { rfcomm_device }
    }
}

impl SerialAdapter for BluezAdapter {
    fn status(&self) -> AdapterStatus {
        match run("bluetoothctl", &["show"], COMMAND_TIMEOUT) {
            Ok(stdout) => parse_controller_status(&stdout),
            Err(e) => {
                debug!(error = %e, "bluetoothctl unavailable");
                AdapterStatus::Unavailable
            }
        }
    }

    fn paired_devices(&self) -> io::Result<Vec<DeviceHandle>> {
        let stdout = run("bluetoothctl", &["devices", "Paired"], COMMAND_TIMEOUT)?;
        let devices = parse_device_list(&stdout);
        if !devices.is_empty() {
            return Ok(devices);
        }

        // BlueZ < 5.65 has no filter argument
        match run("bluetoothctl", &["paired-devices"], COMMAND_TIMEOUT) {
            Ok(stdout) => Ok(parse_device_list(&stdout)),
            Err(_) => Ok(devices),
        }
    }

    fn open(&self, device: &DeviceHandle, timeout: Option<Duration>) -> io::Result<Box<dyn SerialLink>> {
        if !is_valid_mac(&device.address) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' is not a Bluetooth address", device.address),
            ));
        }

        let budget = Budget::new(timeout);
        let (path, binding) = match find_rfcomm_for_mac(&device.address, budget.command_limit()?)? {
            Some(path) => {
                debug!(path = %path.display(), "reusing rfcomm binding");
                (path, None)
            }
            None => {
                let channel = resolve_spp_channel(&device.address, budget.command_limit()?);
                let path = setup_rfcomm(&device.address, self.rfcomm_device, channel, &budget)?;
                (path, Some(self.rfcomm_device))
            }
        };

        let file = match budget.remaining().and_then(|left| open_tty(&path, left)) {
            Ok(file) => file,
            Err(e) => {
                if let Some(index) = binding {
                    release_rfcomm(index);
                }
                return Err(e);
            }
        };

        info!(device = %device, path = %path.display(), "rfcomm link open");
        Ok(Box::new(RfcommLink {
            file: Some(file),
            path,
            binding,
        }))
    }
}

/// Time left for one `open`, shared by every step it takes.
#[derive(Debug, Clone, Copy)]
struct Budget {
    deadline: Option<Instant>,
    limit: Option<Duration>,
}

impl Budget {
    fn new(limit: Option<Duration>) -> Self {
        Self {
            deadline: limit.map(|t| Instant::now() + t),
            limit,
        }
    }

    /// Time left, `None` when unbounded. Fails with `TimedOut` once spent.
    fn remaining(&self) -> io::Result<Option<Duration>> {
        match self.deadline {
            None => Ok(None),
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect budget of {:?} exhausted", self.limit.unwrap_or_default()),
                    ))
                } else {
                    Ok(Some(left))
                }
            }
        }
    }

    /// Limit for the next helper command.
    fn command_limit(&self) -> io::Result<Duration> {
        Ok(self.remaining()?.map_or(COMMAND_TIMEOUT, |left| left.min(COMMAND_TIMEOUT)))
    }

    /// Sleep for the settle delay, cut short by the deadline.
    fn settle(&self) -> io::Result<()> {
        let pause = Duration::from_millis(SETTLE_DELAY_MS);
        thread::sleep(self.remaining()?.map_or(pause, |left| left.min(pause)));
        self.remaining().map(|_| ())
    }
}

// ============================================================================
// LINK
// ============================================================================

/// An open `/dev/rfcommN` TTY, in non-blocking mode.
struct RfcommLink {
    file: Option<File>,
    path: PathBuf,
    /// rfcomm device index to release on close, if we bound it
    binding: Option<u8>,
}

impl RfcommLink {
    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "link closed"))
    }
}

impl SerialLink for RfcommLink {
    fn write(&mut self, buf: &[u8], timeout: Option<Duration>) -> io::Result<usize> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let file = self.file()?;

        loop {
            match file.write(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let left = deadline.map(|d| d.saturating_duration_since(Instant::now()));
                    if left.is_some_and(|l| l.is_zero()) {
                        return Err(stalled());
                    }
                    wait_writable(file, left)?;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the fd hangs up the RFCOMM channel
        self.file.take();
        if let Some(index) = self.binding.take() {
            release_rfcomm(index);
        }
        debug!(path = %self.path.display(), "rfcomm link closed");
        Ok(())
    }
}

fn stalled() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "printer stopped accepting data")
}

/// Open the TTY on a helper thread so a hung radio link can be abandoned.
///
/// The open itself blocks until the RFCOMM channel is up; the returned
/// file is raw and non-blocking.
fn open_tty(path: &Path, timeout: Option<Duration>) -> io::Result<File> {
    let (tx, rx) = mpsc::channel();
    let owned = path.to_path_buf();
    thread::Builder::new()
        .name("rfcomm-open".to_string())
        .spawn(move || {
            let result = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&owned)
                .and_then(|file| {
                    configure_tty_raw(&file)?;
                    set_nonblocking(&file)?;
                    Ok(file)
                });
            // Receiver is gone if we already gave up; the file drops here
            let _ = tx.send(result);
        })?;

    let received = match timeout {
        Some(timeout) => rx.recv_timeout(timeout).map_err(|e| match e {
            mpsc::RecvTimeoutError::Timeout => io::Error::new(
                io::ErrorKind::TimedOut,
                format!("opening {} took longer than {:?}", path.display(), timeout),
            ),
            mpsc::RecvTimeoutError::Disconnected => {
                io::Error::other("rfcomm open thread exited")
            }
        })?,
        None => rx
            .recv()
            .map_err(|_| io::Error::other("rfcomm open thread exited"))?,
    };

    received.map_err(|e| io::Error::new(e.kind(), format!("Failed to open {}: {}", path.display(), e)))
}

/// Wait until the TTY can take more data. `None` waits indefinitely.
#[cfg(unix)]
fn wait_writable(file: &File, timeout: Option<Duration>) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLOUT,
        revents: 0,
    };
    let millis = match timeout {
        // Round up so a sub-millisecond remainder still waits
        Some(t) => t.as_micros().div_ceil(1000).min(libc::c_int::MAX as u128) as libc::c_int,
        None => -1,
    };

    loop {
        let ready = unsafe { libc::poll(&mut pfd, 1, millis) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if ready == 0 {
            return Err(stalled());
        }
        if pfd.revents & (libc::POLLERR | libc::POLLHUP) != 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "rfcomm link hung up"));
        }
        return Ok(());
    }
}

#[cfg(not(unix))]
fn wait_writable(_file: &File, _timeout: Option<Duration>) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_nonblocking(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_nonblocking(_file: &File) -> io::Result<()> {
    Ok(())
}

/// Configure a TTY for raw mode.
///
/// This disables all input/output processing so binary data passes through
/// unmodified. Essential for printer communication.
///
/// ## What Gets Disabled
///
/// - **Input flags**: IGNBRK, BRKINT, PARMRK, ISTRIP, INLCR, IGNCR, ICRNL, IXON, IXOFF, IXANY
/// - **Output flags**: OPOST
/// - **Local flags**: ECHO, ECHONL, ICANON, ISIG, IEXTEN
/// - **Control flags**: CSIZE, PARENB (then CS8 is set)
///
/// Note: IXON/IXOFF/IXANY disable XON/XOFF software flow control. This is critical
/// because 0x11 (XON/DC1) and 0x13 (XOFF/DC3) can appear in bit-image payloads.
#[cfg(unix)]
fn configure_tty_raw(file: &File) -> io::Result<()> {
    use std::mem::MaybeUninit;
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(not(unix))]
fn configure_tty_raw(_file: &File) -> io::Result<()> {
    Ok(())
}

// ============================================================================
// BLUEZ HELPERS
// ============================================================================

/// Run a command, killing it if it outlives `limit`.
///
/// Output is collected on a helper thread so a full pipe cannot stall the
/// child. A command that runs too long reports `TimedOut`.
fn output_within(program: &str, args: &[&str], limit: Duration) -> io::Result<Output> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| io::Error::new(e.kind(), format!("Failed to run {}: {}", program, e)))?;
    let pid = child.id();

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("{}-wait", program))
        .spawn(move || {
            let _ = tx.send(child.wait_with_output());
        })?;

    match rx.recv_timeout(limit) {
        Ok(output) => output,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            kill(pid);
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{} {} did not finish within {:?}", program, args.join(" "), limit),
            ))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(io::Error::other(format!("{} wait thread exited", program)))
        }
    }
}

#[cfg(unix)]
fn kill(pid: u32) {
    // The wait thread reaps the child once it dies
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill(_pid: u32) {}

/// Run a command and return its stdout, failing on a non-zero exit or once
/// `limit` passes.
fn run(program: &str, args: &[&str], limit: Duration) -> io::Result<String> {
    let output = output_within(program, args, limit)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(io::Error::other(format!(
            "{} {} failed: {}",
            program,
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Interpret `bluetoothctl show` output.
pub fn parse_controller_status(output: &str) -> AdapterStatus {
    if !output.lines().any(|l| l.trim_start().starts_with("Controller ")) {
        return AdapterStatus::Unavailable;
    }

    let powered = output
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix("Powered:"))
        .map(str::trim);

    match powered {
        Some("yes") => AdapterStatus::Ready,
        _ => AdapterStatus::Disabled,
    }
}

/// Parse `Device <MAC> <name>` lines from `bluetoothctl`.
///
/// Devices without a name are listed with their address as the name.
pub fn parse_device_list(output: &str) -> Vec<DeviceHandle> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Device ")?;
            let (address, name) = match rest.split_once(' ') {
                Some((address, name)) => (address, name.trim()),
                None => (rest, rest),
            };
            is_valid_mac(address).then(|| DeviceHandle::new(name, address))
        })
        .collect()
}

/// Find the RFCOMM channel of the serial-port service in `sdptool` output.
pub fn parse_spp_channel(output: &str) -> Option<u8> {
    output
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix("Channel:"))
        .and_then(|c| c.trim().parse().ok())
}

/// Classify a failed `l2ping` run from its combined output.
///
/// Only an unanswered echo is a timeout. Errors such as "Host is down" or
/// "No route to host" are immediate refusals and keep a non-timeout kind.
pub fn l2ping_failure_kind(output: &str) -> io::ErrorKind {
    if output.to_lowercase().contains("no response") {
        io::ErrorKind::TimedOut
    } else {
        io::ErrorKind::Other
    }
}

/// SDP lookup of the SPP channel, falling back to channel 1.
fn resolve_spp_channel(mac: &str, limit: Duration) -> u8 {
    let short_uuid = format!("{:#06x}", SERIAL_PORT_PROFILE.as_fields().0);
    match run("sdptool", &["search", "--bdaddr", mac, &short_uuid], limit) {
        Ok(stdout) => parse_spp_channel(&stdout).unwrap_or(DEFAULT_RFCOMM_CHANNEL),
        Err(e) => {
            debug!(error = %e, "SDP lookup failed, using default channel");
            DEFAULT_RFCOMM_CHANNEL
        }
    }
}

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Find an existing RFCOMM device bound to the given MAC address.
///
/// Checks `/proc/net/rfcomm` and falls back to `rfcomm -a` command.
/// Returns the device path (e.g., "/dev/rfcomm0") if found.
pub fn find_rfcomm_for_mac(mac: &str, limit: Duration) -> io::Result<Option<PathBuf>> {
    if let Ok(contents) = fs::read_to_string("/proc/net/rfcomm") {
        if let Some(path) = rfcomm_path_in(&contents, mac) {
            return Ok(Some(path));
        }
    }

    match run("rfcomm", &["-a"], limit) {
        Ok(stdout) => Ok(rfcomm_path_in(&stdout, mac)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Pick the `/dev/rfcommN` bound to `mac` out of a binding listing
/// (format: "rfcomm0: XX:XX:XX:XX:XX:XX channel N ...").
fn rfcomm_path_in(listing: &str, mac: &str) -> Option<PathBuf> {
    let mac_upper = mac.to_uppercase();
    listing
        .lines()
        .filter(|line| line.to_uppercase().contains(&mac_upper))
        .filter_map(|line| line.split(':').next())
        .map(|dev_name| PathBuf::from(format!("/dev/{}", dev_name.trim())))
        .find(|path| path.exists())
}

/// Bind `/dev/rfcomm<index>` to `mac` on `channel`, within `budget`.
///
/// Runs:
/// 1. `bluetoothctl connect <MAC>` - connect to device
/// 2. `l2ping -c 1 -t <secs> <MAC>` - verify connectivity
/// 3. `rfcomm bind <index> <MAC> <channel>` - create /dev/rfcommN
///
/// **Requires root privileges** for `rfcomm bind`.
fn setup_rfcomm(mac: &str, index: u8, channel: u8, budget: &Budget) -> io::Result<PathBuf> {
    let mac_upper = mac.to_uppercase();
    let device_path = PathBuf::from(format!("/dev/rfcomm{}", index));

    // May fail if already connected; l2ping below is the real check
    match run("bluetoothctl", &["connect", &mac_upper], budget.command_limit()?) {
        Ok(stdout) if stdout.contains("Connection successful") => {
            debug!(mac = %mac_upper, "acl link up")
        }
        Ok(stdout) => debug!(mac = %mac_upper, output = %stdout.trim(), "bluetoothctl connect"),
        Err(e) => debug!(mac = %mac_upper, error = %e, "bluetoothctl connect failed"),
    }
    budget.settle()?;

    l2ping(&mac_upper, budget)?;

    run(
        "rfcomm",
        &["bind", &index.to_string(), &mac_upper, &channel.to_string()],
        budget.command_limit()?,
    )?;
    budget.settle()?;

    if !device_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Device {} was not created", device_path.display()),
        ));
    }

    info!(path = %device_path.display(), channel, "bound rfcomm device");
    Ok(device_path)
}

/// One echo request to check the device answers at all.
fn l2ping(mac: &str, budget: &Budget) -> io::Result<()> {
    let limit = budget.command_limit()?;
    // l2ping only takes whole seconds; leave our own kill as the hard bound
    let secs = limit.as_secs().max(1).to_string();

    let output = match output_within("l2ping", &["-c", "1", "-t", &secs, mac], limit) {
        Ok(output) => output,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("l2ping not installed, skipping reachability check");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    if output.status.success() {
        return Ok(());
    }

    let text = format!(
        "{} {}",
        String::from_utf8_lossy(&output.stdout).trim(),
        String::from_utf8_lossy(&output.stderr).trim()
    );
    Err(io::Error::new(
        l2ping_failure_kind(&text),
        format!("Device {} not reachable: {}", mac, text.trim()),
    ))
}

fn release_rfcomm(index: u8) {
    if let Err(e) = run("rfcomm", &["release", &index.to_string()], COMMAND_TIMEOUT) {
        warn!(index, error = %e, "rfcomm release failed");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_mac_addresses() {
        assert!(is_valid_mac("00:11:22:33:44:55"));
        assert!(is_valid_mac("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac("aa:bb:cc:dd:ee:ff"));
        assert!(is_valid_mac("00:00:00:00:00:00"));
    }

    #[test]
    fn test_invalid_mac_addresses() {
        assert!(!is_valid_mac("00:11:22:33:44")); // too short
        assert!(!is_valid_mac("00:11:22:33:44:55:66")); // too long
        assert!(!is_valid_mac("00-11-22-33-44-55")); // wrong separator
        assert!(!is_valid_mac("GG:HH:II:JJ:KK:LL")); // invalid hex
        assert!(!is_valid_mac("")); // empty
        assert!(!is_valid_mac("not-a-mac")); // garbage
    }

    #[test]
    fn test_controller_ready() {
        let output = "Controller 00:1A:7D:DA:71:13 (public)\n\
                      \tName: host\n\
                      \tPowered: yes\n\
                      \tDiscoverable: no\n";
        assert_eq!(parse_controller_status(output), AdapterStatus::Ready);
    }

    #[test]
    fn test_controller_powered_off() {
        let output = "Controller 00:1A:7D:DA:71:13 (public)\n\tPowered: no\n";
        assert_eq!(parse_controller_status(output), AdapterStatus::Disabled);
    }

    #[test]
    fn test_no_controller() {
        assert_eq!(
            parse_controller_status("No default controller available\n"),
            AdapterStatus::Unavailable
        );
        assert_eq!(parse_controller_status(""), AdapterStatus::Unavailable);
    }

    #[test]
    fn test_parse_device_list() {
        let output = "Device 00:11:22:33:44:55 Printer-XP-P800-A\n\
                      Device 66:77:88:99:AA:BB OtherDevice\n\
                      [CHG] Controller 00:1A:7D:DA:71:13 Discovering: yes\n\
                      Device 12:34:56:78:9A:BC\n";
        let devices = parse_device_list(output);

        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0], DeviceHandle::new("Printer-XP-P800-A", "00:11:22:33:44:55"));
        assert_eq!(devices[1].name, "OtherDevice");
        assert_eq!(devices[2].name, "12:34:56:78:9A:BC");
    }

    #[test]
    fn test_parse_device_names_with_spaces() {
        let devices = parse_device_list("Device 00:11:22:33:44:55 XP-P800 Kitchen\n");
        assert_eq!(devices[0].name, "XP-P800 Kitchen");
    }

    #[test]
    fn test_parse_spp_channel() {
        let output = "Searching for 0x1101 on 00:11:22:33:44:55 ...\n\
                      Service Name: SerialPort\n\
                      Service RecHandle: 0x10001\n\
                      Protocol Descriptor List:\n\
                      \x20 \"L2CAP\" (0x0100)\n\
                      \x20 \"RFCOMM\" (0x0003)\n\
                      \x20   Channel: 2\n";
        assert_eq!(parse_spp_channel(output), Some(2));
        assert_eq!(parse_spp_channel("Failed to connect to SDP server"), None);
    }

    #[test]
    fn test_short_uuid_form() {
        assert_eq!(format!("{:#06x}", SERIAL_PORT_PROFILE.as_fields().0), "0x1101");
    }

    #[test]
    fn test_rfcomm_listing_requires_existing_node() {
        let listing = "rfcomm97: 00:11:22:33:44:55 channel 1 clean\n";
        // /dev/rfcomm97 does not exist on a test host
        assert_eq!(rfcomm_path_in(listing, "00:11:22:33:44:55"), None);
    }

    #[test]
    fn test_open_rejects_non_mac_address() {
        let adapter = BluezAdapter::default();
        let result = adapter.open(&DeviceHandle::new("XP-P800", "printer"), None);
        assert_eq!(result.err().map(|e| e.kind()), Some(io::ErrorKind::InvalidInput));
    }

    #[test]
    fn test_l2ping_timeout_vs_refusal() {
        assert_eq!(
            l2ping_failure_kind("Ping: 00:11:22:33:44:55 from 00:1A:7D:DA:71:13 (data size 44) ...\nno response from 00:11:22:33:44:55: id 200"),
            io::ErrorKind::TimedOut
        );
        assert_eq!(l2ping_failure_kind("Can't connect: Host is down"), io::ErrorKind::Other);
        assert_eq!(l2ping_failure_kind("Can't connect: No route to host"), io::ErrorKind::Other);
    }

    #[test]
    fn test_exhausted_budget_times_out() {
        let budget = Budget::new(Some(Duration::ZERO));
        assert_eq!(budget.remaining().unwrap_err().kind(), io::ErrorKind::TimedOut);
        assert_eq!(budget.command_limit().unwrap_err().kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_budget_caps_command_limit() {
        assert_eq!(Budget::new(None).command_limit().unwrap(), COMMAND_TIMEOUT);
        assert!(Budget::new(Some(Duration::from_secs(1))).command_limit().unwrap() <= Duration::from_secs(1));
        assert_eq!(
            Budget::new(Some(Duration::from_secs(600))).command_limit().unwrap(),
            COMMAND_TIMEOUT
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_command_output() {
        assert_eq!(run("echo", &["hi"], COMMAND_TIMEOUT).unwrap(), "hi\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_command_is_killed() {
        let started = Instant::now();
        let err = run("sleep", &["5"], Duration::from_millis(100)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_missing_command_is_not_found() {
        let err = run("snapprint-no-such-tool", &[], COMMAND_TIMEOUT).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    /// A pseudo-terminal pair standing in for `/dev/rfcommN`.
    #[cfg(target_os = "linux")]
    fn open_pty() -> (File, File) {
        use std::ffi::CStr;
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::io::FromRawFd;

        let master = unsafe { libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY) };
        assert!(master >= 0, "posix_openpt failed");
        let mut name = [0 as libc::c_char; 128];
        unsafe {
            assert_eq!(libc::grantpt(master), 0);
            assert_eq!(libc::unlockpt(master), 0);
            assert_eq!(libc::ptsname_r(master, name.as_mut_ptr(), name.len()), 0);
        }
        let path = unsafe { CStr::from_ptr(name.as_ptr()) }
            .to_str()
            .unwrap()
            .to_owned();
        let master = unsafe { File::from_raw_fd(master) };

        let slave = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&path)
            .unwrap();
        configure_tty_raw(&slave).unwrap();
        set_nonblocking(&slave).unwrap();
        (master, slave)
    }

    #[cfg(target_os = "linux")]
    fn link(file: File) -> RfcommLink {
        RfcommLink {
            file: Some(file),
            path: PathBuf::from("/dev/pts/test"),
            binding: None,
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_tty_write_passes_bytes_unmodified() {
        use std::io::Read;

        let (mut master, slave) = open_pty();
        let mut link = link(slave);
        let data = [0x1B, 0x2A, 0x21, 0x0A, 0x0D, 0x11, 0x13];

        assert_eq!(link.write(&data, Some(Duration::from_secs(1))).unwrap(), data.len());
        let mut received = [0u8; 7];
        master.read_exact(&mut received).unwrap();
        assert_eq!(received, data);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_stalled_tty_write_is_bounded() {
        // Nobody reads the master side, so the slave's buffer fills up
        let (_master, slave) = open_pty();
        let mut link = link(slave);
        let data = vec![0u8; 1 << 20];
        let started = Instant::now();

        let mut accepted = 0;
        let err = loop {
            match link.write(&data[accepted..], Some(Duration::from_millis(200))) {
                Ok(n) => accepted += n,
                Err(e) => break e,
            }
            assert!(started.elapsed() < Duration::from_secs(5), "write never stalled");
        };

        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(accepted < data.len());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    // Note: Most transport tests require actual hardware.
    // Integration tests should be run manually with a paired printer.
}
