//! FPGA implementation stages and their pipeline.
//!
//! Each stage validates its input artifacts, invokes one tool inside
//! the temporary directory, copies declared logs and artifacts into the
//! output location, and reports success only when the process exited
//! cleanly AND the expected artifact exists. Some failures leave a
//! stale artifact from a previous run behind, so neither condition is
//! sufficient alone.
//!
//! The full pipeline translates a foreign netlist into the canonical
//! `.ngd` form when needed, then maps, then places-and-routes. Any
//! stage failure aborts the remainder. Bitstream generation and
//! block-RAM data injection are independent follow-on invocations over
//! the place-and-route output.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::device::TargetPart;
use crate::error::{Error, Result};
use crate::paths::OutputPath;
use crate::toolchain::{ImplementationConfig, Implementor, ImplementorInstance};
use crate::ise::process::IseProcess;
use crate::ise::IseEnv;

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::MissingArtifact(path.to_path_buf()))
    }
}

/// Translate a netlist into the canonical `.ngd` database (`ngdbuild`).
pub struct Translate<'a> {
    env: &'a IseEnv,
    output: &'a OutputPath,
    pub netlist: PathBuf,
    pub constraints: Option<PathBuf>,
    pub device: TargetPart,
}

impl<'a> Translate<'a> {
    pub fn new(
        env: &'a IseEnv,
        output: &'a OutputPath,
        netlist: PathBuf,
        constraints: Option<PathBuf>,
        device: TargetPart,
    ) -> Self {
        Self {
            env,
            output,
            netlist,
            constraints,
            device,
        }
    }

    pub fn build(&self) -> Result<bool> {
        let stem = file_stem(&self.netlist);
        let ngo_dir = self.output.temporary_dir.join("ngo");
        let ngd_path = self.output.temporary_dir.join(format!("{}.ngd", stem));
        let bld_path = self.output.temporary_dir.join(format!("{}.bld", stem));

        require_file(&self.netlist)?;
        tracing::debug!("target device name: {}", self.device.alternate_name);

        let mut process = IseProcess::new(self.env, "ngdbuild", &self.output.temporary_dir)
            .args(["-dd", &*ngo_dir.to_string_lossy()]);
        process = match &self.constraints {
            None => process.arg("-i"),
            Some(constraints) => {
                require_file(constraints)?;
                process.args(["-uc", &*constraints.to_string_lossy()])
            }
        };
        let process = process
            // Ignore timestamps, always run.
            .args(["-nt", "on"])
            .args(["-p", self.device.alternate_name.as_str()])
            .arg("-verbose")
            .arg(self.netlist.to_string_lossy())
            .arg(ngd_path.to_string_lossy());

        fs::create_dir_all(&ngo_dir)?;
        let result = process.run()?;

        self.output.copy_log_file(&bld_path)?;
        self.output.copy_output_file(&ngd_path)?;

        Ok(result.success() && ngd_path.is_file())
    }
}

/// Map the translated design onto device resources (`map`).
pub struct Map<'a> {
    env: &'a IseEnv,
    output: &'a OutputPath,
    pub ngd_file: PathBuf,
    pub device: TargetPart,
}

impl<'a> Map<'a> {
    pub fn new(env: &'a IseEnv, output: &'a OutputPath, ngd_file: PathBuf, device: TargetPart) -> Self {
        Self {
            env,
            output,
            ngd_file,
            device,
        }
    }

    pub fn build(&self) -> Result<bool> {
        let stem = file_stem(&self.ngd_file);
        let pcf_path = self.output.temporary_dir.join(format!("{}.pcf", stem));
        let ncd_path = self.output.temporary_dir.join(format!("{}.ncd", stem));
        let mrp_path = self.output.temporary_dir.join(format!("{}.mrp", stem));

        require_file(&self.ngd_file)?;
        tracing::debug!("target device name: {}", self.device.alternate_name);

        let result = IseProcess::new(self.env, "map", &self.output.temporary_dir)
            .args(["-p", self.device.alternate_name.as_str()])
            // Overwrite existing files.
            .arg("-w")
            .args(["-logic_opt", "off"])
            .args(["-ol", "high"])
            .args(["-global_opt", "off"])
            // Multi-threaded execution is not available on all parts.
            .args(["-mt", "off"])
            .args(["-ir", "off"])
            .args(["-power", "off"])
            .args(["-o", &*ncd_path.to_string_lossy()])
            .arg(self.ngd_file.to_string_lossy())
            .arg(pcf_path.to_string_lossy())
            .run()?;

        self.output.copy_log_file(&mrp_path)?;
        self.output.copy_output_file(&ncd_path)?;
        self.output.copy_output_file(&pcf_path)?;

        Ok(result.success() && ncd_path.is_file())
    }
}

/// Place and route the mapped design (`par`).
pub struct PlaceAndRoute<'a> {
    env: &'a IseEnv,
    output: &'a OutputPath,
    pub ncd_file: PathBuf,
    pub pcf_file: PathBuf,
}

impl<'a> PlaceAndRoute<'a> {
    pub fn new(env: &'a IseEnv, output: &'a OutputPath, ncd_file: PathBuf, pcf_file: PathBuf) -> Self {
        Self {
            env,
            output,
            ncd_file,
            pcf_file,
        }
    }

    pub fn build(&self) -> Result<bool> {
        let stem = file_stem(&self.ncd_file);
        let routed_ncd_path = self.output.temporary_dir.join(format!("{}.ncd", stem));
        let par_path = self.output.temporary_dir.join(format!("{}.par", stem));
        let grf_path = self.output.temporary_dir.join(format!("{}.grf", stem));

        require_file(&self.ncd_file)?;
        require_file(&self.pcf_file)?;

        let result = IseProcess::new(self.env, "par", &self.output.temporary_dir)
            .arg("-w")
            .args(["-ol", "high"])
            .args(["-mt", "off"])
            .arg(self.ncd_file.to_string_lossy())
            .arg(routed_ncd_path.to_string_lossy())
            .arg(self.pcf_file.to_string_lossy())
            .run()?;

        self.output.copy_log_file(&par_path)?;
        self.output.copy_log_file(&grf_path)?;
        self.output.copy_output_file(&routed_ncd_path)?;

        Ok(result.success() && routed_ncd_path.is_file())
    }
}

/// Generate the configuration bitstream (`bitgen`).
pub struct BitstreamGenerator<'a> {
    env: &'a IseEnv,
    output: &'a OutputPath,
    pub ncd_file: PathBuf,
}

impl<'a> BitstreamGenerator<'a> {
    pub fn new(env: &'a IseEnv, output: &'a OutputPath, ncd_file: PathBuf) -> Self {
        Self {
            env,
            output,
            ncd_file,
        }
    }

    pub fn build(&self) -> Result<bool> {
        let stem = file_stem(&self.ncd_file);
        let bit_path = self.output.temporary_dir.join(format!("{}.bit", stem));
        let bgn_path = self.output.temporary_dir.join(format!("{}.bgn", stem));

        require_file(&self.ncd_file)?;

        let result = IseProcess::new(self.env, "bitgen", &self.output.temporary_dir)
            .arg("-w")
            .arg(self.ncd_file.to_string_lossy())
            .run()?;

        self.output.copy_log_file(&bgn_path)?;
        self.output.copy_output_file(&bit_path)?;

        Ok(result.success() && bit_path.is_file())
    }
}

/// Inject block-RAM contents into a generated bitstream (`data2mem`).
///
/// The memory-map description and the `.mem` data file are opaque
/// inputs produced elsewhere.
pub struct BitstreamDataInjector<'a> {
    env: &'a IseEnv,
    output: &'a OutputPath,
    pub bitstream: PathBuf,
    pub memory_map: PathBuf,
    pub data_file: PathBuf,
}

impl<'a> BitstreamDataInjector<'a> {
    pub fn new(
        env: &'a IseEnv,
        output: &'a OutputPath,
        bitstream: PathBuf,
        memory_map: PathBuf,
        data_file: PathBuf,
    ) -> Self {
        Self {
            env,
            output,
            bitstream,
            memory_map,
            data_file,
        }
    }

    pub fn build(&self) -> Result<bool> {
        let stem = file_stem(&self.bitstream);
        let injected_path = self
            .output
            .temporary_dir
            .join(format!("{}_mem.bit", stem));

        require_file(&self.bitstream)?;
        require_file(&self.memory_map)?;
        require_file(&self.data_file)?;

        let result = IseProcess::new(self.env, "data2mem", &self.output.temporary_dir)
            .args(["-bm", &*self.memory_map.to_string_lossy()])
            .args(["-bd", &*self.data_file.to_string_lossy()])
            .args(["-bt", &*self.bitstream.to_string_lossy()])
            .args(["-o", "b", &*injected_path.to_string_lossy()])
            .run()?;

        self.output.copy_output_file(&injected_path)?;

        Ok(result.success() && injected_path.is_file())
    }
}

/// The FPGA implementation backend.
pub struct FpgaImplementor {
    env: Arc<IseEnv>,
}

impl FpgaImplementor {
    pub fn new(env: Arc<IseEnv>) -> Self {
        Self { env }
    }
}

impl Implementor for FpgaImplementor {
    fn create(
        &self,
        output: &OutputPath,
        config: ImplementationConfig,
    ) -> Result<Box<dyn ImplementorInstance>> {
        Ok(Box::new(FpgaImplementorInstance {
            env: Arc::clone(&self.env),
            output: output.clone(),
            config,
        }))
    }
}

/// One implementation run: translate (when needed), map, place-and-route.
pub struct FpgaImplementorInstance {
    env: Arc<IseEnv>,
    output: OutputPath,
    config: ImplementationConfig,
}

impl FpgaImplementorInstance {
    /// The routed design produced by a successful [`build`](Self::build).
    fn routed_ncd(&self) -> PathBuf {
        let stem = file_stem(&self.config.netlist);
        self.output.output_dir.join(format!("{}.ncd", stem))
    }
}

impl ImplementorInstance for FpgaImplementorInstance {
    fn build(&mut self) -> Result<bool> {
        let netlist = &self.config.netlist;
        let stem = file_stem(netlist);
        require_file(netlist)?;

        // Translate only when the netlist is not already in the
        // canonical form.
        let mut ngd_file = netlist.clone();
        let is_ngd = netlist
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("ngd"));
        if !is_ngd {
            let translate = Translate::new(
                &self.env,
                &self.output,
                netlist.clone(),
                self.config.constraints.clone(),
                self.config.device.clone(),
            );
            tracing::info!("running netlist translation");
            if !translate.build()? {
                tracing::info!("translation failed");
                return Ok(false);
            }
            tracing::info!("translation complete");
            ngd_file = self.output.output_dir.join(format!("{}.ngd", stem));
        }

        let map = Map::new(
            &self.env,
            &self.output,
            ngd_file,
            self.config.device.clone(),
        );
        tracing::info!("running mapping");
        if !map.build()? {
            tracing::info!("mapping failed");
            return Ok(false);
        }
        tracing::info!("mapping complete");

        let ncd_file = self.output.output_dir.join(format!("{}.ncd", stem));
        let pcf_file = self.output.output_dir.join(format!("{}.pcf", stem));
        let par = PlaceAndRoute::new(&self.env, &self.output, ncd_file, pcf_file);
        tracing::info!("running place and route");
        if !par.build()? {
            tracing::info!("place and route failed");
            return Ok(false);
        }
        tracing::info!("place and route complete");

        Ok(true)
    }

    fn generate_bitstream(&mut self) -> Result<bool> {
        let generator = BitstreamGenerator::new(&self.env, &self.output, self.routed_ncd());
        tracing::info!("running bitstream generation");
        generator.build()
    }

    fn inject_data(&mut self, memory_map: &Path, data_file: &Path) -> Result<bool> {
        let stem = file_stem(&self.config.netlist);
        let bitstream = self.output.output_dir.join(format!("{}.bit", stem));
        let injector = BitstreamDataInjector::new(
            &self.env,
            &self.output,
            bitstream,
            memory_map.to_path_buf(),
            data_file.to_path_buf(),
        );
        tracing::info!("running block-RAM data injection");
        injector.build()
    }
}
