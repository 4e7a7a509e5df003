use ndarray::{Array1, Array2, Array3, ArrayD, IxDyn};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use um_regrid::array::{Coordinate, DataArray};
use um_regrid::config::{CdoConfig, ComputeConfig};
use um_regrid::errors::{Result, UmRegridError};
use um_regrid::grid::Grid;
use um_regrid::lazy::{LazyArray, LazyChunk};
use um_regrid::regrid::{
    regrid, valid_mask, CdoWeightGenerator, NativeBilinear, Regridder, RemapMethod, WeightGenerator,
};

fn lat_coord(values: &[f64]) -> Coordinate {
    Coordinate::from_1d("lat", values.to_vec()).with_attr("units", "degrees_north")
}

fn lon_coord(values: &[f64]) -> Coordinate {
    Coordinate::from_1d("lon", values.to_vec()).with_attr("units", "degrees_east")
}

/// A (lat, lon) field with values 1, 2, 3, ... in row-major order
fn field(lats: &[f64], lons: &[f64]) -> DataArray {
    let values = Array2::from_shape_fn((lats.len(), lons.len()), |(j, i)| (j * lons.len() + i + 1) as f64);
    DataArray::new(["lat", "lon"], values.into_dyn())
        .unwrap()
        .with_name("tos")
        .with_coord(lat_coord(lats))
        .unwrap()
        .with_coord(lon_coord(lons))
        .unwrap()
}

/// A (time, lat, lon) field whose slices differ by 100 per step
fn timeseries(nt: usize, lats: &[f64], lons: &[f64]) -> DataArray {
    let (ny, nx) = (lats.len(), lons.len());
    let values = Array3::from_shape_fn((nt, ny, nx), |(t, j, i)| (t * 100 + j * nx + i) as f64);
    DataArray::new(["time", "lat", "lon"], values.into_dyn())
        .unwrap()
        .with_name("tos")
        .with_coord(Coordinate::from_1d("time", (0..nt).map(|t| t as f64).collect()))
        .unwrap()
        .with_coord(lat_coord(lats))
        .unwrap()
        .with_coord(lon_coord(lons))
        .unwrap()
}

fn assert_close(a: &ArrayD<f64>, b: &ArrayD<f64>) {
    assert_eq!(a.shape(), b.shape());
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < 1e-9, "{x} != {y}");
    }
}

fn cdo_available() -> bool {
    Command::new("cdo").arg("--version").output().is_ok()
}

#[test]
fn test_identity_regrid() -> Result<()> {
    let cases: [(&[f64], &[f64]); 3] = [
        (&[-45.0, 45.0], &[0.0, 180.0]),
        (&[-45.0, 45.0], &[0.0, 90.0, 180.0, 270.0]),
        (&[-60.0, 0.0, 60.0], &[0.0, 90.0, 180.0, 270.0]),
    ];
    for (lats, lons) in cases {
        let source = field(lats, lons);
        let out = regrid(&source, &source, RemapMethod::Bilinear, &NativeBilinear)?;
        assert_eq!(out.dims, vec!["lat", "lon"]);
        assert_close(&out.values()?, &source.values()?);
    }
    Ok(())
}

#[test]
fn test_regrid_to_finer_grid() -> Result<()> {
    let source = field(&[-45.0, 45.0], &[0.0, 90.0, 180.0, 270.0]);
    let target = Grid::rectilinear(vec![-45.0, 0.0, 45.0], vec![0.0, 45.0, 90.0, 315.0])?;

    let out = regrid(&source, &target, RemapMethod::Bilinear, &NativeBilinear)?;
    let values = out.values()?;
    assert_eq!(values.shape(), &[3, 4]);

    // Midway between rows 1..4 and 5..8
    assert!((values[[1, 0]] - 3.0).abs() < 1e-12);
    // Midway between lon 0 and 90 on the first row
    assert!((values[[0, 1]] - 1.5).abs() < 1e-12);
    // Across the seam, between lon 270 and 360
    assert!((values[[0, 3]] - 2.5).abs() < 1e-12);

    let lat = out.coord("lat").expect("destination latitude");
    assert_eq!(lat.units(), Some("degrees_north"));
    Ok(())
}

#[test]
fn test_points_outside_source_are_nan() -> Result<()> {
    let source = field(&[-45.0, 45.0], &[0.0, 90.0, 180.0, 270.0]);
    let target = Grid::rectilinear(vec![-80.0, 0.0], vec![0.0])?;

    let out = regrid(&source, &target, RemapMethod::Bilinear, &NativeBilinear)?;
    let values = out.values()?;
    assert!(values[[0, 0]].is_nan());
    assert!(values[[1, 0]].is_finite());
    Ok(())
}

#[test]
fn test_extra_dimensions_pass_through() -> Result<()> {
    let lats = [-45.0, 45.0];
    let lons = [0.0, 90.0, 180.0, 270.0];
    let source = timeseries(3, &lats, &lons);
    let target = Grid::rectilinear(vec![-45.0, 0.0, 45.0], vec![45.0, 135.0])?;
    let regridder = Regridder::new(&source, &target, RemapMethod::Bilinear, &NativeBilinear)?;

    let out = regridder.regrid(&source)?;
    assert_eq!(out.dims, vec!["time", "lat", "lon"]);
    assert_eq!(out.shape(), vec![3, 3, 2]);
    assert!(out.coord("time").is_some());

    let all = out.values()?;
    for t in 0..3 {
        let single = regridder.regrid(&source.isel("time", t)?)?;
        let expected = all.index_axis(ndarray::Axis(0), t).to_owned();
        assert_close(&single.values()?, &expected);
    }
    Ok(())
}

#[test]
fn test_horizontal_axes_keep_their_position() -> Result<()> {
    let lats = [-45.0, 45.0];
    let lons = [0.0, 90.0, 180.0, 270.0];
    let values = Array3::from_shape_fn((2, 4, 5), |(j, i, k)| (k * 10 + j * 4 + i) as f64);
    let source = DataArray::new(["lat", "lon", "member"], values.into_dyn())?
        .with_coord(lat_coord(&lats))?
        .with_coord(lon_coord(&lons))?;

    let out = regrid(&source, &source, RemapMethod::Bilinear, &NativeBilinear)?;
    assert_eq!(out.dims, vec!["lat", "lon", "member"]);
    assert_close(&out.values()?, &source.values()?);
    Ok(())
}

#[test]
fn test_lazy_input_stays_lazy() -> Result<()> {
    let lats = [-45.0, 45.0];
    let lons = [0.0, 90.0, 180.0, 270.0];
    let eager = timeseries(4, &lats, &lons);
    let values = Arc::new(eager.values()?);

    let reads = Arc::new(AtomicUsize::new(0));
    let chunks = (0..4)
        .map(|t| {
            let values = Arc::clone(&values);
            let reads = Arc::clone(&reads);
            LazyChunk::new(1, move || {
                reads.fetch_add(1, Ordering::SeqCst);
                let slice = values.index_axis(ndarray::Axis(0), t).to_owned();
                Ok(slice.insert_axis(ndarray::Axis(0)))
            })
        })
        .collect();
    let mut lazy = eager.clone();
    lazy.data = LazyArray::from_chunks(vec![4, 2, 4], 0, chunks)?.into();

    let target = Grid::rectilinear(vec![0.0], vec![45.0, 225.0])?;
    let out = regrid(&lazy, &target, RemapMethod::Bilinear, &NativeBilinear)?;
    assert!(out.is_lazy());
    assert_eq!(reads.load(Ordering::SeqCst), 0);

    let expected = regrid(&eager, &target, RemapMethod::Bilinear, &NativeBilinear)?;
    assert_close(&out.values()?, &expected.values()?);
    assert_eq!(reads.load(Ordering::SeqCst), 4);
    Ok(())
}

#[test]
fn test_lazy_compute_with_thread_pool() -> Result<()> {
    let values = ArrayD::from_shape_fn(IxDyn(&[6, 2, 3]), |idx| (idx[0] * 6 + idx[1] * 3 + idx[2]) as f64);
    let lazy = LazyArray::from_array(values.clone(), 0, 4)?;
    assert_eq!(lazy.chunk_lens(), vec![4, 2]);
    assert_eq!(lazy.compute_with(&ComputeConfig::with_threads(2))?, values);
    Ok(())
}

#[test]
fn test_wrong_horizontal_shape() -> Result<()> {
    let source = field(&[-45.0, 45.0], &[0.0, 90.0, 180.0, 270.0]);
    let regridder = Regridder::new(&source, &source, RemapMethod::Bilinear, &NativeBilinear)?;

    let other = field(&[-60.0, 0.0, 60.0], &[0.0, 90.0, 180.0, 270.0]);
    let err = regridder.regrid(&other).unwrap_err();
    assert!(matches!(err, UmRegridError::RegridShapeError { .. }));
    Ok(())
}

#[test]
fn test_bare_array_uses_weight_shape() -> Result<()> {
    let source = field(&[-45.0, 45.0], &[0.0, 90.0, 180.0, 270.0]);
    let regridder = Regridder::new(&source, &source, RemapMethod::Bilinear, &NativeBilinear)?;

    let bare = DataArray::new(["t", "y", "x"], ArrayD::<f64>::ones(IxDyn(&[2, 2, 4])))?;
    let out = regridder.regrid(&bare)?;
    assert_eq!(out.dims, vec!["t", "lat", "lon"]);
    assert!(out.values()?.iter().all(|&v| (v - 1.0).abs() < 1e-12));
    Ok(())
}

#[test]
fn test_identification_errors_are_not_masked_by_shape() -> Result<()> {
    let source = field(&[-45.0, 45.0], &[0.0, 90.0, 180.0, 270.0]);
    let regridder = Regridder::new(&source, &source, RemapMethod::Bilinear, &NativeBilinear)?;

    let odd_units = DataArray::new(["lat", "lon"], ArrayD::<f64>::ones(IxDyn(&[2, 4])))?
        .with_coord(Coordinate::from_1d("lat", vec![-45.0, 45.0]).with_attr("units", "furlongs"))?
        .with_coord(lon_coord(&[0.0, 90.0, 180.0, 270.0]))?;
    let err = regridder.regrid(&odd_units).unwrap_err();
    assert!(matches!(err, UmRegridError::GridIdentificationError(_)));

    let two_lons = DataArray::new(["y", "x"], ArrayD::<f64>::ones(IxDyn(&[2, 4])))?
        .with_coord(Coordinate::from_1d("y", vec![0.0, 90.0]).with_attr("units", "degrees_east"))?
        .with_coord(Coordinate::from_1d("x", vec![0.0, 90.0, 180.0, 270.0]).with_attr("units", "degrees_east"))?;
    let err = regridder.regrid(&two_lons).unwrap_err();
    assert!(matches!(err, UmRegridError::GridIdentificationError(_)));
    Ok(())
}

#[test]
fn test_masked_cells_are_excluded() -> Result<()> {
    let mut source = field(&[-45.0, 45.0], &[0.0, 90.0, 180.0, 270.0]);
    let mut values = source.values()?;
    values[[0, 1]] = f64::NAN;
    source.data = values.into();

    let mask = valid_mask(&source)?;
    assert!(!mask[[0, 1]]);
    assert_eq!(mask.iter().filter(|&&v| v).count(), 7);

    let target = Grid::rectilinear(vec![-45.0, 45.0], vec![45.0, 225.0])?;
    let regridder = Regridder::with_mask(&source, &target, RemapMethod::Bilinear, &NativeBilinear, &mask)?;
    assert_eq!(regridder.weights().num_links(), 6);

    let out = regridder.regrid(&source)?.values()?;
    // The stencil at (-45, 45) reaches the masked cell
    assert!(out[[0, 0]].is_nan());
    assert!((out[[0, 1]] - 3.5).abs() < 1e-12);
    assert!((out[[1, 0]] - 5.5).abs() < 1e-12);
    assert!((out[[1, 1]] - 7.5).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_partly_masked_stencil_is_missing() -> Result<()> {
    let mut values = Array2::from_elem((2, 4), 300.0);
    values[[0, 1]] = f64::NAN;
    let source = DataArray::new(["lat", "lon"], values.into_dyn())?
        .with_name("tos")
        .with_coord(lat_coord(&[-45.0, 45.0]))?
        .with_coord(lon_coord(&[0.0, 90.0, 180.0, 270.0]))?;
    let mask = valid_mask(&source)?;

    let target = Grid::rectilinear(vec![0.0], vec![45.0, 225.0])?;
    let regridder = Regridder::with_mask(&source, &target, RemapMethod::Bilinear, &NativeBilinear, &mask)?;
    let sums = regridder.weights().weight_sums();
    assert_eq!(sums[0], 0.0);
    assert!((sums[1] - 1.0).abs() < 1e-12);

    let out = regridder.regrid(&source)?.values()?;
    assert!(out[[0, 0]].is_nan());
    assert!((out[[0, 1]] - 300.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_weights_file_round_trip() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("weights.nc");

    let source = timeseries(2, &[-45.0, 45.0], &[0.0, 90.0, 180.0, 270.0]);
    let target = Grid::rectilinear(vec![-45.0, 0.0, 45.0], vec![45.0, 135.0, 300.0])?;
    let regridder = Regridder::new(&source, &target, RemapMethod::Bilinear, &NativeBilinear)?;
    regridder.save_weights(&path)?;

    let reloaded = Regridder::from_weights_file(&path)?;
    assert_eq!(reloaded.weights().num_links(), regridder.weights().num_links());
    assert_eq!(reloaded.weights().dst_shape(), (3, 3));
    assert_close(&reloaded.regrid(&source)?.values()?, &regridder.regrid(&source)?.values()?);
    Ok(())
}

#[test]
fn test_native_generator_rejects_other_methods() {
    let source = Grid::rectilinear(vec![-45.0, 45.0], vec![0.0, 180.0]).unwrap();
    let err = NativeBilinear
        .generate_weights(&source, &source, RemapMethod::Conservative, None)
        .unwrap_err();
    assert!(matches!(err, UmRegridError::WeightGenerationError { .. }));
}

#[test]
fn test_missing_cdo_reports_weight_error() {
    let source = Grid::rectilinear(vec![-45.0, 45.0], vec![0.0, 180.0]).unwrap();
    let generator = CdoWeightGenerator::new(CdoConfig::with_executable("/nonexistent/cdo"));
    let err = generator
        .generate_weights(&source, &source, RemapMethod::Bilinear, None)
        .unwrap_err();
    assert!(matches!(
        err,
        UmRegridError::WeightGenerationError { .. } | UmRegridError::IoError(_)
    ));
}

#[test]
fn test_cdo_weights_match_native_bilinear() -> Result<()> {
    if !cdo_available() {
        eprintln!("cdo not found, skipping");
        return Ok(());
    }
    let lats: Vec<f64> = (0..18).map(|j| -85.0 + 10.0 * j as f64).collect();
    let lons: Vec<f64> = (0..36).map(|i| 5.0 + 10.0 * i as f64).collect();
    let source = field(&lats, &lons);
    let target = Grid::rectilinear(
        Array1::linspace(-60.0, 60.0, 7),
        Array1::linspace(10.0, 350.0, 18),
    )?;

    let generator = CdoWeightGenerator::new(CdoConfig::default());
    let from_cdo = regrid(&source, &target, RemapMethod::Bilinear, &generator)?;
    let native = regrid(&source, &target, RemapMethod::Bilinear, &NativeBilinear)?;
    assert_eq!(from_cdo.shape(), vec![7, 18]);

    // CDO interpolates in spherical coordinates, so allow a small difference
    for (a, b) in from_cdo.values()?.iter().zip(native.values()?.iter()) {
        assert!((a - b).abs() < 0.5, "{a} vs {b}");
    }
    Ok(())
}

#[test]
fn test_cdo_weights_match_remapbil() -> Result<()> {
    if !cdo_available() {
        eprintln!("cdo not found, skipping");
        return Ok(());
    }
    let temp_dir = tempdir()?;
    let input = temp_dir.path().join("input.nc");
    let source = field(
        &[-80.0, -40.0, 0.0, 40.0, 80.0],
        &(0..8).map(|i| 45.0 * i as f64).collect::<Vec<_>>(),
    );
    um_regrid::netcdf_io::write_dataarray(&source, &input)?;

    let targets = [
        Grid::rectilinear(vec![-45.0, 45.0], vec![0.0, 90.0, 180.0, 270.0])?,
        Grid::rectilinear(vec![-60.0, 0.0, 60.0], vec![0.0, 90.0, 180.0, 270.0])?,
    ];
    let generator = CdoWeightGenerator::new(CdoConfig::default());
    for (k, target) in targets.iter().enumerate() {
        let grid_path = temp_dir.path().join(format!("target{k}.grid"));
        let output = temp_dir.path().join(format!("remapbil{k}.nc"));
        target.write_cdo_grid(&grid_path)?;
        let status = Command::new("cdo")
            .arg("-s")
            .arg(format!("remapbil,{}", grid_path.display()))
            .arg(&input)
            .arg(&output)
            .status()?;
        assert!(status.success());

        let expected = um_regrid::netcdf_io::open_dataarray(&output, "tos")?;
        let ours = regrid(&source, target, RemapMethod::Bilinear, &generator)?;
        assert_eq!(ours.shape(), expected.shape());
        for (a, b) in ours.values()?.iter().zip(expected.values()?.iter()) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }
    Ok(())
}
