//! Gadget function compositions.
//!
//! A [`Plan`] is computed purely from the requested functions, the modem
//! topology and the configuration, then applied to a [`Gadget`] in one
//! pass. Link order is significant: it fixes the interface numbering seen
//! by the host, and the debug bridge is always linked last.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{Functions, Gadget, Id, Monitor, Result, Settings, Topology};

/// Root of the FunctionFS mounts of userspace-backed functions.
pub const FFS_ROOT: &str = "/dev/usb-ffs";

/// Default RNDIS function name.
pub const DEFAULT_RNDIS_FUNCTION: &str = "gsi.rndis";

const DIAG: &str = "diag.diag";
const DIAG_MDM: &str = "diag.diag_mdm";
const QDSS: &str = "qdss.qdss";
const QDSS_MDM: &str = "qdss.qdss_mdm";
const DUN: &str = "cser.dun.0";

/// FunctionFS instance that a userspace process must initialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfsInstance {
    /// FunctionFS mount directory.
    pub dir: PathBuf,
    /// Endpoints that appear once the userspace process has written its descriptors.
    pub endpoints: Vec<PathBuf>,
}

impl FfsInstance {
    fn new(name: &str, endpoints: usize) -> Self {
        let dir = Path::new(FFS_ROOT).join(name);
        let endpoints = (1..=endpoints).map(|n| dir.join(format!("ep{n}"))).collect();
        Self { dir, endpoints }
    }
}

/// A function to link into the composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Function name in configfs, i.e. `<driver>.<instance>`.
    pub function: String,
    /// FunctionFS instance, if the function is userspace-backed.
    pub ffs: Option<FfsInstance>,
    /// Whether OS descriptors must be enabled for this function.
    pub os_descriptors: bool,
}

impl Link {
    fn kernel(function: impl AsRef<str>) -> Self {
        Self { function: function.as_ref().to_string(), ffs: None, os_descriptors: false }
    }

    fn ffs(function: &str, ffs: FfsInstance, os_descriptors: bool) -> Self {
        Self { function: function.to_string(), ffs: Some(ffs), os_descriptors }
    }

    fn adb() -> Self {
        Self::ffs("ffs.adb", FfsInstance::new("adb", 2), false)
    }

    /// Whether this is the debug bridge function.
    pub fn is_adb(&self) -> bool {
        self.function == "ffs.adb"
    }
}

/// Ordered set of function links and the identity to present them under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composition {
    /// Function links in link order.
    pub links: Vec<Link>,
    /// Composition-specific identity replacing the generic one.
    pub id: Option<Id>,
}

impl Composition {
    /// Whether any linked function needs a userspace process to attach before pull-up.
    pub fn needs_userspace(&self) -> bool {
        self.links.iter().any(|link| link.ffs.is_some())
    }

    /// Function names in link order.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.links.iter().map(|link| link.function.as_str())
    }

    fn push(&mut self, link: Link) {
        self.links.push(link);
    }

    fn extend<'a>(&mut self, functions: impl IntoIterator<Item = &'a str>) {
        self.links.extend(functions.into_iter().map(Link::kernel));
    }

    /// Links the functions and sets the composition-specific identity.
    ///
    /// FunctionFS instances are registered with the monitor.
    /// The first failure aborts; links already made are left in place
    /// for the next gadget reset to remove.
    pub fn apply(&self, gadget: &dyn Gadget, monitor: &dyn Monitor) -> Result<()> {
        for (index, link) in self.links.iter().enumerate() {
            if link.os_descriptors {
                gadget.enable_os_descriptors()?;
            }
            if let Some(ffs) = &link.ffs {
                monitor.add_ffs_dir(&ffs.dir)?;
            }

            gadget.link_function(&link.function, index)?;

            if let Some(ffs) = &link.ffs {
                for endpoint in &ffs.endpoints {
                    monitor.add_endpoint(endpoint);
                }
            }
        }

        if let Some(id) = self.id {
            gadget.set_id(id)?;
        }

        Ok(())
    }
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let functions: Vec<_> = self.functions().collect();
        write!(f, "[{}]", functions.join(", "))?;
        if let Some(id) = self.id {
            write!(f, " as {id}")?;
        }
        Ok(())
    }
}

/// How to realize a requested function set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Link the composition.
    Compose(Composition),
    /// Hand the gadget over to the configured vendor composition.
    ///
    /// Nothing is linked and no identity is set.
    VendorOverride(String),
}

/// Computes the plan for the requested functions.
pub fn plan(functions: Functions, topology: Topology, settings: &Settings) -> Plan {
    let mut comp = generic(functions, settings);

    if functions.contains(Functions::RNDIS | Functions::ADB) {
        let dpl = settings.dpl_link();
        match topology {
            Topology::External | Topology::InternalExternal => {
                log::info!("external modem network composition");
                comp.extend([DIAG, DIAG_MDM, QDSS, QDSS_MDM, DUN, dpl.as_str()]);
                comp.id = Some(Id::EXTERNAL_NETWORK_DEFAULT);
            }
            Topology::Internal => {
                log::info!("internal modem network composition");
                comp.extend([DIAG, QDSS, DUN, dpl.as_str()]);
                comp.id = Some(Id::INTERNAL_NETWORK_DEFAULT);
            }
            Topology::None => (),
        }
    }

    if comp.links.is_empty() && functions.contains(Functions::ADB) {
        if let Some(vendor_config) = &settings.vendor_config {
            log::info!("vendor composition {vendor_config}");
            return Plan::VendorOverride(vendor_config.clone());
        }

        let dpl = settings.dpl_link();
        let rmnet = settings.rmnet_link();
        match topology {
            Topology::External | Topology::InternalExternal => {
                log::info!("external modem default composition");
                comp.extend([DIAG, DIAG_MDM, QDSS, QDSS_MDM, DUN, dpl.as_str(), rmnet.as_str()]);
                comp.id = Some(Id::EXTERNAL_DEFAULT);
            }
            Topology::None => {
                log::info!("standalone default composition");
                comp.extend([DIAG]);
                comp.id = Some(Id::STANDALONE_DEFAULT);
            }
            Topology::Internal => {
                log::info!("modem default composition");
                comp.extend([DIAG, DUN, rmnet.as_str(), dpl.as_str(), QDSS]);
                comp.id = Some(Id::MODEM_DEFAULT);
            }
        }
    }

    if functions.contains(Functions::ADB) {
        comp.push(Link::adb());
    }

    Plan::Compose(comp)
}

/// Links of the generic functions, in link order.
fn generic(functions: Functions, settings: &Settings) -> Composition {
    let mut comp = Composition::default();

    if functions.contains(Functions::MTP) {
        comp.push(Link::ffs("ffs.mtp", FfsInstance::new("mtp", 3), true));
    } else if functions.contains(Functions::PTP) {
        comp.push(Link::ffs("ffs.ptp", FfsInstance::new("ptp", 3), true));
    }

    if functions.contains(Functions::MIDI) {
        comp.push(Link::kernel("midi.gs5"));
    }

    if functions.contains(Functions::ACCESSORY) {
        comp.push(Link::kernel("accessory.gs2"));
    }

    if functions.contains(Functions::AUDIO_SOURCE) {
        comp.push(Link::kernel("audio_source.gs3"));
    }

    if functions.contains(Functions::RNDIS) {
        comp.push(Link::kernel(settings.rndis_function.as_deref().unwrap_or(DEFAULT_RNDIS_FUNCTION)));
    }

    comp
}

#[cfg(test)]
mod test {
    use super::*;

    fn settings() -> Settings {
        Settings {
            controller: Some("a600000.dwc3".to_string()),
            rndis_function: None,
            rmnet_function: "gsi".to_string(),
            rmnet_instance: "rmnet".to_string(),
            dpl_instance: "dpl".to_string(),
            vendor_config: None,
        }
    }

    fn compose(functions: Functions, topology: Topology, settings: &Settings) -> Composition {
        match plan(functions, topology, settings) {
            Plan::Compose(comp) => comp,
            Plan::VendorOverride(cfg) => panic!("unexpected vendor override {cfg}"),
        }
    }

    fn names(comp: &Composition) -> Vec<&str> {
        comp.functions().collect()
    }

    #[test]
    fn adb_standalone() {
        let comp = compose(Functions::ADB, Topology::None, &settings());
        assert_eq!(names(&comp), ["diag.diag", "ffs.adb"]);
        assert_eq!(comp.id, Some(Id::STANDALONE_DEFAULT));
        assert!(comp.needs_userspace());
    }

    #[test]
    fn adb_internal() {
        let comp = compose(Functions::ADB, Topology::Internal, &settings());
        assert_eq!(names(&comp), ["diag.diag", "cser.dun.0", "gsi.rmnet", "gsi.dpl", "qdss.qdss", "ffs.adb"]);
        assert_eq!(comp.id, Some(Id::MODEM_DEFAULT));
    }

    #[test]
    fn adb_external() {
        for topology in [Topology::External, Topology::InternalExternal] {
            let comp = compose(Functions::ADB, topology, &settings());
            assert_eq!(
                names(&comp),
                [
                    "diag.diag",
                    "diag.diag_mdm",
                    "qdss.qdss",
                    "qdss.qdss_mdm",
                    "cser.dun.0",
                    "gsi.dpl",
                    "gsi.rmnet",
                    "ffs.adb"
                ]
            );
            assert_eq!(comp.id, Some(Id::EXTERNAL_DEFAULT));
        }
    }

    #[test]
    fn rndis_adb_internal() {
        let comp = compose(Functions::RNDIS | Functions::ADB, Topology::Internal, &settings());
        assert_eq!(names(&comp), ["gsi.rndis", "diag.diag", "qdss.qdss", "cser.dun.0", "gsi.dpl", "ffs.adb"]);
        assert_eq!(comp.id, Some(Id::INTERNAL_NETWORK_DEFAULT));
    }

    #[test]
    fn rndis_adb_external() {
        let mut settings = settings();
        settings.rndis_function = Some("rndis_bam.rndis".to_string());

        let comp = compose(Functions::RNDIS | Functions::ADB, Topology::InternalExternal, &settings);
        assert_eq!(
            names(&comp),
            [
                "rndis_bam.rndis",
                "diag.diag",
                "diag.diag_mdm",
                "qdss.qdss",
                "qdss.qdss_mdm",
                "cser.dun.0",
                "gsi.dpl",
                "ffs.adb"
            ]
        );
        assert_eq!(comp.id, Some(Id::EXTERNAL_NETWORK_DEFAULT));
    }

    #[test]
    fn rndis_adb_standalone_links_nothing_extra() {
        let comp = compose(Functions::RNDIS | Functions::ADB, Topology::None, &settings());
        assert_eq!(names(&comp), ["gsi.rndis", "ffs.adb"]);
        assert_eq!(comp.id, None);
    }

    #[test]
    fn generic_functions_skip_modem_defaults() {
        let comp = compose(Functions::MTP | Functions::ADB, Topology::Internal, &settings());
        assert_eq!(names(&comp), ["ffs.mtp", "ffs.adb"]);
        assert_eq!(comp.id, None);
        assert!(comp.links[0].os_descriptors);
        assert_eq!(comp.links[0].ffs.as_ref().unwrap().endpoints.len(), 3);

        let comp = compose(Functions::ACCESSORY | Functions::AUDIO_SOURCE, Topology::External, &settings());
        assert_eq!(names(&comp), ["accessory.gs2", "audio_source.gs3"]);
        assert!(!comp.needs_userspace());
    }

    #[test]
    fn ptp_only_without_mtp() {
        let comp = compose(Functions::PTP, Topology::Internal, &settings());
        assert_eq!(names(&comp), ["ffs.ptp"]);
        assert_eq!(comp.links[0].ffs.as_ref().unwrap().dir, Path::new("/dev/usb-ffs/ptp"));
    }

    #[test]
    fn adb_always_last() {
        for topology in [Topology::Internal, Topology::External, Topology::InternalExternal, Topology::None] {
            for bits in 0..=Functions::all().bits() {
                let functions = Functions::from_bits_retain(bits);
                let comp = compose(functions, topology, &settings());
                let adb: Vec<_> = comp.links.iter().enumerate().filter(|(_, l)| l.is_adb()).map(|(i, _)| i).collect();

                if functions.contains(Functions::ADB) {
                    assert_eq!(adb, [comp.links.len() - 1], "{functions} on {topology}");
                } else {
                    assert!(adb.is_empty(), "{functions} on {topology}");
                }
            }
        }
    }

    #[test]
    fn vendor_override() {
        let mut settings = settings();
        settings.vendor_config = Some("custom_usb_cfg".to_string());

        for topology in [Topology::Internal, Topology::External, Topology::None] {
            assert_eq!(
                plan(Functions::ADB, topology, &settings),
                Plan::VendorOverride("custom_usb_cfg".to_string())
            );
        }

        // Generic functions take precedence over the vendor composition.
        let comp = compose(Functions::MIDI | Functions::ADB, Topology::Internal, &settings);
        assert_eq!(names(&comp), ["midi.gs5", "ffs.adb"]);
    }
}
