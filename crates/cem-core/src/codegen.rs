//! C# program generation for the PicoGK / ShapeKernel / LatticeLibrary
//! toolchain.
//!
//! The emitted program builds the recommended shapes, optionally fills the
//! primary body with a lattice, smooths, reports mass and volume, and writes
//! `<output>.stl` plus a `<output>_meta.json` sidecar.

use serde::{Deserialize, Serialize};

use crate::lattice::{LatticeKind, LatticeParams};
use crate::materials;
use crate::shapes::{BaseShape, ShapePart, ShapeRecommendation};
use crate::spec::{DesignSpecification, DeviceType};

pub const PROGRAM_FILE_NAME: &str = "GeneratedDesign.cs";
pub const DEFAULT_VOXEL_SIZE_MM: f64 = 0.5;
/// Shell kept around a lattice core, mm.
const LATTICE_SHELL_MM: f64 = 1.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodegenOptions {
    /// Base name of the STL and metadata files.
    pub output_name: String,
    /// Directory the program writes into; empty means the working directory.
    #[serde(default)]
    pub output_dir: String,
    #[serde(default = "default_voxel_size")]
    pub voxel_size_mm: f64,
    #[serde(default = "default_smoothing")]
    pub smoothing_passes: u32,
}

fn default_voxel_size() -> f64 {
    DEFAULT_VOXEL_SIZE_MM
}

fn default_smoothing() -> u32 {
    1
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            output_name: "generated_design".into(),
            output_dir: String::new(),
            voxel_size_mm: DEFAULT_VOXEL_SIZE_MM,
            smoothing_passes: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedProgram {
    pub file_name: String,
    pub output_name: String,
    pub source: String,
}

/// Format a float as an invariant-culture C# `float` literal.
pub fn csharp_float(v: f64) -> String {
    if !v.is_finite() {
        return "0f".to_string();
    }
    let rounded = (v * 1000.0).round() / 1000.0;
    let mut s = format!("{rounded}");
    if !s.contains('.') {
        s.push_str(".0");
    }
    s.push('f');
    s
}

/// Make `raw` a valid C# identifier in PascalCase.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::new();
    let mut upper = true;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if upper {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
            upper = false;
        } else {
            upper = true;
        }
    }
    if out.is_empty() {
        return "Part".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Sanitize a file base name: keeps `[A-Za-z0-9_-]`, everything else becomes `_`.
pub fn sanitize_file_stem(raw: &str) -> String {
    let s: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if s.is_empty() { "generated_design".to_string() } else { s }
}

fn csharp_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

struct CodeWriter {
    buf: String,
    indent: usize,
}

impl CodeWriter {
    fn new() -> Self {
        Self {
            buf: String::new(),
            indent: 0,
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.indent {
                self.buf.push_str("    ");
            }
            self.buf.push_str(text);
        }
        self.buf.push('\n');
    }

    fn open(&mut self, header: impl AsRef<str>) {
        self.line(header);
        self.line("{");
        self.indent += 1;
    }

    fn close(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("}");
    }
}

fn vec3(x: f64, y: f64, z: f64) -> String {
    format!(
        "new Vector3({}, {}, {})",
        csharp_float(x),
        csharp_float(y),
        csharp_float(z)
    )
}

/// Constructor expression for a shape placed at height `z`.
fn shape_ctor(shape: &BaseShape, z: f64) -> String {
    let frame = format!("new LocalFrame({})", vec3(0.0, 0.0, z));
    let f = csharp_float;
    match *shape {
        BaseShape::Box { length, width, height } => {
            format!("new BaseBox({frame}, {}, {}, {})", f(height), f(length), f(width))
        }
        BaseShape::Sphere { radius } => format!("new BaseSphere({frame}, {})", f(radius)),
        BaseShape::Cylinder { radius, height } => {
            format!("new BaseCylinder({frame}, {}, {})", f(height), f(radius))
        }
        BaseShape::Pipe { outer_radius, inner_radius, length } => format!(
            "new BasePipe({frame}, {}, {}, {})",
            f(length),
            f(inner_radius),
            f(outer_radius)
        ),
        BaseShape::Lens { radius, thickness } => {
            format!("new BaseLens({frame}, {}, 0f, {})", f(thickness), f(radius))
        }
        BaseShape::Ring { major_radius, minor_radius } => {
            format!("new BaseRing({frame}, {}, {})", f(major_radius), f(minor_radius))
        }
    }
}

/// Height a shape occupies along Z.
fn z_extent(shape: &BaseShape) -> f64 {
    match *shape {
        BaseShape::Box { height, .. } => height,
        BaseShape::Sphere { radius } => 2.0 * radius,
        BaseShape::Cylinder { height, .. } => height,
        BaseShape::Pipe { length, .. } => length,
        BaseShape::Lens { thickness, .. } => thickness,
        BaseShape::Ring { minor_radius, .. } => 2.0 * minor_radius,
    }
}

fn emit_part(w: &mut CodeWriter, part: &ShapePart, var: &str, z: f64) {
    let class = part.shape.kernel_class();
    w.line(format!("// {} ({class})", part.role));
    w.line(format!("{class} o{var} = {};", shape_ctor(&part.shape, z)));
    w.line(format!("Voxels vox{var} = o{var}.voxConstruct();"));
}

fn emit_lattice(w: &mut CodeWriter, lattice: &LatticeParams, target: &str) {
    let cell = csharp_float(lattice.cell_size_mm);
    let beam = csharp_float(lattice.beam_thickness_mm);
    w.line(format!(
        "// {:?} lattice infill, cell {:.1} mm, beam {:.2} mm",
        lattice.kind, lattice.cell_size_mm, lattice.beam_thickness_mm
    ));
    match lattice.kind {
        LatticeKind::Conformal => {
            let n = lattice.cells_per_dimension.unwrap_or(4);
            w.line(format!(
                "ICellArray xCellArray = new ConformalCellArray({target}, {n}, {n}, {n});"
            ));
        }
        _ => w.line(format!(
            "ICellArray xCellArray = new RegularCellArray({target}, {cell}, {cell}, {cell});"
        )),
    }
    w.line("ILatticeType xLatticeType = new BodyCentreLattice();");
    match lattice.kind {
        LatticeKind::Regular => {
            w.line(format!(
                "IBeamThickness xBeamThickness = new ConstantBeamThickness({beam});"
            ));
        }
        LatticeKind::Conformal => {
            w.line(format!(
                "IBeamThickness xBeamThickness = new BoundaryBeamThickness({beam}, {});",
                csharp_float(lattice.beam_thickness_mm * 1.5)
            ));
        }
        LatticeKind::Gradient => {
            let min = csharp_float(lattice.min_beam_thickness_mm.unwrap_or(lattice.beam_thickness_mm));
            let max = csharp_float(lattice.max_beam_thickness_mm.unwrap_or(lattice.beam_thickness_mm));
            w.line("IBeamThickness xBeamThickness = new GlobalFuncBeamThickness(");
            w.indent += 1;
            w.line(format!("{min}, {max},"));
            w.line("(Vector3 vecPt) => Uf.fLimitValue(vecPt.Z / fTotalHeight, 0f, 1f));");
            w.indent -= 1;
        }
    }
    w.line(format!("xBeamThickness.SetBoundingVoxels({target});"));
    w.line(format!(
        "Voxels voxLattice = voxGetFinalLatticeGeometry(xCellArray, xLatticeType, xBeamThickness, {});",
        lattice.subsampling
    ));
    w.line(format!("Voxels voxCore = voxLattice.voxBoolIntersect({target});"));
    w.line(format!(
        "Voxels voxShell = {target}.voxBoolSubtract({target}.voxOffset(-{}));",
        csharp_float(LATTICE_SHELL_MM)
    ));
    w.line(format!("{target} = voxShell.voxBoolAdd(voxCore);"));
}

/// Generate the complete C# program for a design.
pub fn generate_csharp(
    spec: &DesignSpecification,
    shapes: &ShapeRecommendation,
    lattice: Option<&LatticeParams>,
    opts: &CodegenOptions,
) -> GeneratedProgram {
    let output_name = sanitize_file_stem(&opts.output_name);
    let material_name = spec.primary_material();
    let density = materials::lookup(material_name).map_or(1.25, |m| m.density);
    let mut w = CodeWriter::new();

    w.line("// Generated by cem. Do not edit; regenerate from the specification instead.");
    for ns in [
        "System",
        "System.IO",
        "System.Numerics",
        "System.Text.Json",
        "PicoGK",
        "Leap71.ShapeKernel",
        "Leap71.LatticeLibrary",
    ] {
        w.line(format!("using {ns};"));
    }
    w.line("");
    w.open("namespace Cem.Generated");
    w.open("public static class GeneratedDesign");
    w.line(format!("const string sOutputName = {};", csharp_string(&output_name)));
    w.line(format!("const string sOutputDir = {};", csharp_string(&opts.output_dir)));
    w.line(format!("const string sMaterial = {};", csharp_string(material_name)));
    w.line(format!("const float fDensity = {}; // g/cm3", csharp_float(density)));
    w.line("static bool s_bHeadless = false;");
    w.line("");
    w.open("public static void Main(string[] args)");
    w.line("s_bHeadless = Array.IndexOf(args, \"--headless\") >= 0;");
    w.line(format!("Library.Go({}, Task);", csharp_float(opts.voxel_size_mm)));
    w.close();
    w.line("");
    w.open("public static void Task()");
    w.open("try");
    w.line(format!(
        "Library.Log(\"Generating {} ({})\");",
        spec.device_type,
        shapes.primary.shape.kernel_class()
    ));

    let primary_var = sanitize_identifier(&shapes.primary.role);
    let primary_height = z_extent(&shapes.primary.shape);
    let repeats = match spec.device_type {
        DeviceType::RobotArm => spec.motion.dof.unwrap_or(3).max(1),
        _ => 1,
    };
    let total_height = primary_height * f64::from(repeats)
        + shapes.secondary.iter().map(|p| z_extent(&p.shape)).sum::<f64>();
    w.line(format!("float fTotalHeight = {};", csharp_float(total_height.max(1.0))));

    if repeats > 1 {
        // Chained links with a joint part at each interface.
        let joint = shapes.secondary.first();
        w.line(format!("Voxels vox{primary_var} = new Voxels();"));
        w.open(format!("for (int i = 0; i < {repeats}; i++)"));
        w.line(format!(
            "float fZ = i * {};",
            csharp_float(primary_height)
        ));
        let ctor = shape_ctor(&shapes.primary.shape, 0.0)
            .replace(&vec3(0.0, 0.0, 0.0), "new Vector3(0f, 0f, fZ)");
        w.line(format!("vox{primary_var}.BoolAdd(({ctor}).voxConstruct());"));
        if let Some(joint) = joint {
            let jctor = shape_ctor(&joint.shape, 0.0)
                .replace(&vec3(0.0, 0.0, 0.0), "new Vector3(0f, 0f, fZ)");
            w.line(format!("vox{primary_var}.BoolAdd(({jctor}).voxConstruct());"));
        }
        w.close();
    } else {
        emit_part(&mut w, &shapes.primary, &primary_var, 0.0);
    }

    if let Some(lattice) = lattice {
        emit_lattice(&mut w, lattice, &format!("vox{primary_var}"));
    }

    w.line(format!("Voxels voxResult = vox{primary_var};"));
    let mut z = primary_height * f64::from(repeats);
    let skip_joint = usize::from(repeats > 1);
    for (i, part) in shapes.secondary.iter().enumerate().skip(skip_joint) {
        let var = format!("{}{}", sanitize_identifier(&part.role), i);
        emit_part(&mut w, part, &var, z);
        w.line(format!("voxResult.BoolAdd(vox{var});"));
        z += z_extent(&part.shape);
    }

    for _ in 0..opts.smoothing_passes {
        w.line(format!("voxResult.Smoothen({});", csharp_float(opts.voxel_size_mm)));
    }

    w.line("");
    w.line("voxResult.CalculateProperties(out float fVolumeMM3, out BBox3 oBBox);");
    w.line("float fMassG = fVolumeMM3 / 1000f * fDensity;");
    w.line("Library.Log($\"Volume: {fVolumeMM3} mm3, mass: {fMassG} g\");");
    w.line("");
    w.line("string sStlPath = Path.Combine(sOutputDir, sOutputName + \".stl\");");
    w.line("string sMetaPath = Path.Combine(sOutputDir, sOutputName + \"_meta.json\");");
    w.line("voxResult.mshAsMesh().SaveToStlFile(sStlPath);");
    w.open("var oMeta = new");
    w.line(format!("device_type = {},", csharp_string(spec.device_type.as_str())));
    w.line("material = sMaterial,");
    w.line("density_g_cm3 = fDensity,");
    w.line("volume_mm3 = fVolumeMM3,");
    w.line("mass_g = fMassG,");
    w.line("bbox_min = new[] { oBBox.vecMin.X, oBBox.vecMin.Y, oBBox.vecMin.Z },");
    w.line("bbox_max = new[] { oBBox.vecMax.X, oBBox.vecMax.Y, oBBox.vecMax.Z },");
    w.line(format!(
        "lattice = {},",
        csharp_string(&lattice.map_or("none".to_string(), |l| format!("{:?}", l.kind).to_lowercase()))
    ));
    w.line(format!("voxel_size_mm = {},", csharp_float(opts.voxel_size_mm)));
    w.indent -= 1;
    w.line("};");
    w.line("File.WriteAllText(sMetaPath, JsonSerializer.Serialize(oMeta));");
    w.open("if (!s_bHeadless)");
    w.line("Library.oViewer().Add(voxResult);");
    w.close();
    w.line("Library.Log($\"STL: {sStlPath}\");");
    w.close();
    w.open("catch (Exception e)");
    w.line("Library.Log($\"Error: {e.Message}\");");
    w.line("Console.Error.WriteLine(e);");
    w.line("Environment.Exit(1);");
    w.close();
    w.close();
    w.close();
    w.close();

    GeneratedProgram {
        file_name: PROGRAM_FILE_NAME.to_string(),
        output_name,
        source: w.buf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::calculate_lattice;
    use crate::shapes::recommend_shape;
    use crate::spec::OptimizationGoal;

    fn program(spec: &DesignSpecification) -> GeneratedProgram {
        let shapes = recommend_shape(spec);
        let lattice = calculate_lattice(spec, &shapes.primary.shape);
        generate_csharp(spec, &shapes, lattice.as_ref(), &CodegenOptions::default())
    }

    #[test]
    fn test_float_literals_are_invariant() {
        assert_eq!(csharp_float(12.5), "12.5f");
        assert_eq!(csharp_float(10.0), "10.0f");
        assert_eq!(csharp_float(0.12345), "0.123f");
        assert_eq!(csharp_float(f64::NAN), "0f");
        assert_eq!(csharp_float(-3.0), "-3.0f");
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(sanitize_identifier("link"), "Link");
        assert_eq!(sanitize_identifier("tilt head-2"), "TiltHead2");
        assert_eq!(sanitize_identifier("3d part"), "_3dPart");
        assert_eq!(sanitize_identifier("!!"), "Part");
        assert_eq!(sanitize_file_stem("my arm/v2"), "my_arm_v2");
    }

    #[test]
    fn test_box_program_structure() {
        let p = program(&DesignSpecification::new(DeviceType::Custom));
        assert_eq!(p.file_name, "GeneratedDesign.cs");
        assert!(p.source.contains("Library.Go(0.5f, Task);"));
        assert!(p.source.contains("new BaseBox("));
        assert!(p.source.contains("SaveToStlFile(sStlPath)"));
        assert!(p.source.contains("_meta.json"));
        assert!(!p.source.contains("voxGetFinalLatticeGeometry"));
        let opens = p.source.matches('{').count();
        let closes = p.source.matches('}').count();
        assert_eq!(opens, closes);
    }

    #[test]
    fn test_lightweight_arm_has_lattice_and_links() {
        let mut spec = DesignSpecification::new(DeviceType::RobotArm);
        spec.dimensions.reach_mm = Some(300.0);
        spec.motion.dof = Some(3);
        spec.optimization_goals.push(OptimizationGoal::Lightweight);
        let p = program(&spec);
        assert!(p.source.contains("for (int i = 0; i < 3; i++)"));
        assert!(p.source.contains("new BasePipe(new LocalFrame(new Vector3(0f, 0f, fZ))"));
        assert!(p.source.contains("RegularCellArray(voxLink, 7.5f, 7.5f, 7.5f)"));
        assert!(p.source.contains("ConstantBeamThickness(0.8f)"));
        assert!(p.source.contains("voxBoolIntersect(voxLink)"));
    }

    #[test]
    fn test_output_name_is_escaped() {
        let spec = DesignSpecification::new(DeviceType::Gripper);
        let shapes = recommend_shape(&spec);
        let opts = CodegenOptions {
            output_name: "grip\"per".into(),
            output_dir: "C:\\out".into(),
            ..CodegenOptions::default()
        };
        let p = generate_csharp(&spec, &shapes, None, &opts);
        assert_eq!(p.output_name, "grip_per");
        assert!(p.source.contains("const string sOutputDir = \"C:\\\\out\";"));
    }
}
