//! Centralized host and file naming conventions.
//!
//! This module is the single source of truth for how package resources are
//! laid out on a host:
//! - Host roots for App and DLC packages (e.g., `https://cdn/game/linux/1.2.0/core`)
//! - Version files (e.g., `core.version`)
//! - Manifest files (e.g., `core_42.json`)
//!
//! All other modules should use these functions rather than constructing URLs directly.

/// Host root of an App package.
///
/// # Format
///
/// `{server}/{product}/{platform}/{app_version}/{package}`
///
/// # Examples
///
/// ```
/// use bundlepatch::package::app_host_url;
///
/// assert_eq!(
///     app_host_url("https://cdn.example.com/", "game", "linux", "1.2.0", "core"),
///     "https://cdn.example.com/game/linux/1.2.0/core"
/// );
/// ```
pub fn app_host_url(
    server: &str,
    product: &str,
    platform: &str,
    app_version: &str,
    package: &str,
) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        server.trim_end_matches('/'),
        product,
        platform,
        app_version,
        package
    )
}

/// Host root of a DLC package.
///
/// # Format
///
/// `{server}/{product}/{platform}/DLC/{package}/{dlc_version}`, or without the
/// `{platform}/` segment when `without_platform` is set.
///
/// # Examples
///
/// ```
/// use bundlepatch::package::dlc_host_url;
///
/// assert_eq!(
///     dlc_host_url("https://cdn.example.com", "game", "android", "maps", "v3", false),
///     "https://cdn.example.com/game/android/DLC/maps/v3"
/// );
/// assert_eq!(
///     dlc_host_url("https://cdn.example.com", "game", "android", "maps", "v3", true),
///     "https://cdn.example.com/game/DLC/maps/v3"
/// );
/// ```
pub fn dlc_host_url(
    server: &str,
    product: &str,
    platform: &str,
    package: &str,
    dlc_version: &str,
    without_platform: bool,
) -> String {
    let server = server.trim_end_matches('/');
    if without_platform {
        format!("{}/{}/DLC/{}/{}", server, product, package, dlc_version)
    } else {
        format!(
            "{}/{}/{}/DLC/{}/{}",
            server, product, platform, package, dlc_version
        )
    }
}

/// Name of the plain-text file holding a package's current version.
///
/// ```
/// use bundlepatch::package::version_file_name;
///
/// assert_eq!(version_file_name("core"), "core.version");
/// ```
pub fn version_file_name(package: &str) -> String {
    format!("{}.version", package)
}

/// Name of the manifest document for one package version.
///
/// ```
/// use bundlepatch::package::manifest_file_name;
///
/// assert_eq!(manifest_file_name("core", "42"), "core_42.json");
/// ```
pub fn manifest_file_name(package: &str, version: &str) -> String {
    format!("{}_{}.json", package, version)
}

/// Full URL of a file below a host root.
pub fn file_url(host_root: &str, file_name: &str) -> String {
    format!(
        "{}/{}",
        host_root.trim_end_matches('/'),
        file_name.trim_start_matches('/')
    )
}
