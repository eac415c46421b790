//! XST synthesis backend.
//!
//! Synthesis writes a synthesis-only project file and an XST command
//! script into the temporary directory, runs `xst`, and checks for the
//! produced `.ngc` netlist.

use std::fs;
use std::sync::Arc;

use crate::error::Result;
use crate::paths::OutputPath;
use crate::project::ProjectFile;
use crate::repository::{Applicability, Repository};
use crate::toolchain::{SynthesisConfig, Synthesizer, SynthesizerInstance};
use crate::ise::process::IseProcess;
use crate::ise::IseEnv;

pub struct XstSynthesizer {
    env: Arc<IseEnv>,
}

impl XstSynthesizer {
    pub fn new(env: Arc<IseEnv>) -> Self {
        Self { env }
    }
}

impl Synthesizer for XstSynthesizer {
    fn create(
        &self,
        output: &OutputPath,
        config: SynthesisConfig,
    ) -> Result<Box<dyn SynthesizerInstance>> {
        Ok(Box::new(XstInstance {
            env: Arc::clone(&self.env),
            output: output.clone(),
            config,
        }))
    }
}

/// One XST synthesis run.
pub struct XstInstance {
    env: Arc<IseEnv>,
    output: OutputPath,
    config: SynthesisConfig,
}

impl SynthesizerInstance for XstInstance {
    fn build(&mut self, repo: &mut Repository) -> Result<bool> {
        let module_name = repo.module(self.config.module).name().to_string();

        let project_path = self.output.temporary_dir.join(format!("{}.prj", module_name));
        let script_path = self.output.temporary_dir.join(format!("{}.xst", module_name));
        let report_path = self.output.temporary_dir.join(format!("{}.syr", module_name));
        let netlist_name = format!("{}.ngc", module_name);
        let netlist_path = self.output.temporary_dir.join(&netlist_name);

        let project = ProjectFile::from_module(repo, self.config.module);
        fs::write(
            &project_path,
            project.render(repo, Applicability::SynthesisOnly)?,
        )?;

        tracing::debug!("top level module name: {}", module_name);
        tracing::debug!("target device name: {}", self.config.device.alternate_name);
        fs::write(
            &script_path,
            xst_script(
                &project_path.to_string_lossy(),
                &netlist_name,
                &self.config.device.alternate_name,
                &module_name,
            ),
        )?;

        // XST keeps its working state in nested directories of its own.
        let xst_dir = self.output.temporary_dir.join("xst");
        fs::create_dir_all(xst_dir.join(".tmp"))?;

        let result = IseProcess::new(&self.env, "xst", &self.output.temporary_dir)
            .args(["-ifn", &*script_path.to_string_lossy()])
            .args(["-ofn", &*report_path.to_string_lossy()])
            .run()?;

        self.output.copy_log_file(&report_path)?;
        self.output.copy_output_file(&netlist_path)?;

        Ok(result.success() && netlist_path.is_file())
    }
}

/// The XST command script: the `set` preamble plus one `run` with the
/// full option set the project flow relies on.
fn xst_script(project_file: &str, output_file: &str, device: &str, top_module: &str) -> String {
    let mut script = String::new();
    script.push_str("set -tmpdir \"xst/.tmp\"\n");
    script.push_str("set -xsthdpdir \"xst\"\n");
    script.push_str("run\n");
    script.push_str(&format!("-ifn {}\n", project_file));
    script.push_str("-ifmt mixed\n");
    script.push_str(&format!("-ofn {}\n", output_file));
    script.push_str("-ofmt NGC\n");
    script.push_str(&format!("-p {}\n", device));
    script.push_str(&format!("-top {}\n", top_module));
    script.push_str("-opt_mode Speed\n");
    script.push_str("-opt_level 1\n");
    script.push_str("-power NO\n");
    script.push_str("-iuc NO\n");
    script.push_str("-keep_hierarchy No\n");
    script.push_str("-netlist_hierarchy As_Optimized\n");
    script.push_str("-rtlview Yes\n");
    script.push_str("-glob_opt AllClockNets\n");
    script.push_str("-read_cores YES\n");
    script.push_str("-write_timing_constraints NO\n");
    script.push_str("-cross_clock_analysis NO\n");
    script.push_str("-hierarchy_separator /\n");
    script.push_str("-bus_delimiter <>\n");
    script.push_str("-case Maintain\n");
    script.push_str("-slice_utilization_ratio 100\n");
    script.push_str("-bram_utilization_ratio 100\n");
    script.push_str("-fsm_extract YES -fsm_encoding Auto\n");
    script.push_str("-safe_implementation No\n");
    script.push_str("-fsm_style LUT\n");
    script.push_str("-ram_extract Yes\n");
    script.push_str("-ram_style Auto\n");
    script.push_str("-rom_extract Yes\n");
    script.push_str("-shreg_extract YES\n");
    script.push_str("-rom_style Auto\n");
    script.push_str("-resource_sharing YES\n");
    script.push_str("-register_duplication YES\n");
    script.push_str("-register_balancing No\n");
    script.push_str("-optimize_primitives NO\n");
    script.push_str("-use_clock_enable Auto\n");
    script.push_str("-use_sync_set Auto\n");
    script.push_str("-use_sync_reset Auto\n");
    script.push_str("-iob Auto\n");
    script.push_str("-equivalent_register_removal YES\n");
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_carries_project_device_and_top() {
        let script = xst_script("work/top.prj", "top.ngc", "xc3s100e-4vq100", "top");
        assert!(script.contains("-ifn work/top.prj\n"));
        assert!(script.contains("-ofn top.ngc\n"));
        assert!(script.contains("-p xc3s100e-4vq100\n"));
        assert!(script.contains("-top top\n"));
        assert!(script.starts_with("set -tmpdir"));
    }
}
