use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{Array1, Array3};
use netcdf::{create, open};
use tempfile::tempdir;
use um_regrid::array::{Coordinate, DataArray, Dataset};
use um_regrid::data_source::{DataSource, NetCDFSeries, NetCDFSource};
use um_regrid::errors::{Result, UmRegridError};
use um_regrid::netcdf_io::{
    data_variable_names, open_dataarray, open_dataarray_lazy, open_dataset, open_mfdataarray_lazy, slice_dataarray,
    write_dataarray, write_dataset, FILL_VALUE,
};
use um_regrid::regrid::{NativeBilinear, Regridder, RemapMethod};
use um_regrid::split_var::{split_by_var, write_split_vars};

fn day(d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1979, 1, d)
        .and_then(|date| date.and_hms_opt(12, 0, 0))
        .expect("valid date")
}

fn sample_array(name: &str) -> DataArray {
    let values = Array3::from_shape_fn((3, 2, 4), |(t, j, i)| (t * 8 + j * 4 + i) as f64);
    DataArray::new(["time", "lat", "lon"], values.into_dyn())
        .unwrap()
        .with_name(name)
        .with_attr("long_name", "sea surface temperature")
        .with_coord(Coordinate::time("time", vec![day(1), day(2), day(3)]))
        .unwrap()
        .with_coord(Coordinate::from_1d("lat", vec![-45.0, 45.0]).with_attr("units", "degrees_north"))
        .unwrap()
        .with_coord(Coordinate::from_1d("lon", vec![0.0, 90.0, 180.0, 270.0]).with_attr("units", "degrees_east"))
        .unwrap()
}

/// A file laid out the way reanalysis products store packed fields
fn write_packed_file(path: &std::path::Path) {
    let mut file = create(path).expect("Failed to create NetCDF file");
    file.add_dimension("time", 2).expect("Failed to add dimension time");
    file.add_dimension("latitude", 2).expect("Failed to add dimension latitude");
    file.add_dimension("longitude", 3).expect("Failed to add dimension longitude");

    let mut time = file.add_variable::<f64>("time", &["time"]).expect("Failed to add time");
    time.put_attribute("units", "hours since 1900-01-01 00:00:00").unwrap();
    time.put_attribute("calendar", "gregorian").unwrap();
    time.put(Array1::from(vec![0.0, 6.0]).view(), ..).unwrap();

    let mut lat = file.add_variable::<f64>("latitude", &["latitude"]).expect("Failed to add latitude");
    lat.put_attribute("units", "degrees_north").unwrap();
    lat.put(Array1::from(vec![10.0, -10.0]).view(), ..).unwrap();

    let mut lon = file.add_variable::<f64>("longitude", &["longitude"]).expect("Failed to add longitude");
    lon.put_attribute("units", "degrees_east").unwrap();
    lon.put(Array1::from(vec![0.0, 120.0, 240.0]).view(), ..).unwrap();

    let mut sst = file
        .add_variable::<i16>("sst", &["time", "latitude", "longitude"])
        .expect("Failed to add sst");
    sst.put_attribute("scale_factor", 0.5f64).unwrap();
    sst.put_attribute("add_offset", 270.0f64).unwrap();
    sst.put_attribute("_FillValue", -32767i16).unwrap();
    sst.put_attribute("units", "K").unwrap();
    let raw = Array3::from_shape_vec((2, 2, 3), vec![0i16, 2, 4, 6, -32767, 10, 12, 14, 16, 18, 20, 22]).unwrap();
    sst.put(raw.view(), ..).unwrap();
}

#[test]
fn test_read_decodes_cf_conventions() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("packed.nc");
    write_packed_file(&path);

    let sst = open_dataarray(&path, "sst")?;
    assert_eq!(sst.dims, vec!["time", "latitude", "longitude"]);
    let values = sst.values()?;
    assert_eq!(values[[0, 0, 1]], 271.0);
    assert!(values[[0, 1, 1]].is_nan());
    assert_eq!(values[[1, 1, 2]], 281.0);

    assert_eq!(sst.attr_str("units"), Some("K"));
    assert!(!sst.attrs.contains_key("scale_factor"));

    let time = sst.coord("time").expect("time coordinate");
    let times = time.times().expect("decoded times");
    assert_eq!(times[1], NaiveDate::from_ymd_opt(1900, 1, 1).unwrap().and_hms_opt(6, 0, 0).unwrap());
    assert!(sst.coord("latitude").is_some());
    Ok(())
}

#[test]
fn test_write_read_round_trip() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("round_trip.nc");

    let mut array = sample_array("tos");
    let mut values = array.values()?;
    values[[1, 0, 2]] = f64::NAN;
    array.data = values.clone().into();
    write_dataarray(&array, &path)?;

    {
        let file = open(&path)?;
        let var = file.variable("tos").expect("tos written");
        let raw = var.get_values::<f64, _>(..)?;
        assert_eq!(raw[8 + 2], FILL_VALUE);
        assert!(file.attribute("history").is_some());
    }

    let back = open_dataarray(&path, "tos")?;
    assert_eq!(back.dims, array.dims);
    assert_eq!(back.attr_str("long_name"), Some("sea surface temperature"));
    let read = back.values()?;
    assert!(read[[1, 0, 2]].is_nan());
    assert_eq!(read[[2, 1, 3]], values[[2, 1, 3]]);
    assert_eq!(back.coord("time").and_then(|c| c.times()), Some(&[day(1), day(2), day(3)][..]));
    Ok(())
}

#[test]
fn test_lazy_read_matches_eager() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("lazy.nc");
    write_dataarray(&sample_array("tos"), &path)?;

    let lazy = open_dataarray_lazy(&path, "tos", "time", 2)?;
    assert!(lazy.is_lazy());
    let eager = open_dataarray(&path, "tos")?;
    assert_eq!(lazy.values()?, eager.values()?);

    let err = open_dataarray_lazy(&path, "tos", "depth", 2).unwrap_err();
    assert!(matches!(err, UmRegridError::DimensionNotFound { .. }));
    Ok(())
}

#[test]
fn test_lazy_regrid_written_chunkwise() -> Result<()> {
    let temp_dir = tempdir()?;
    let input = temp_dir.path().join("input.nc");
    let output = temp_dir.path().join("output.nc");
    write_dataarray(&sample_array("tos"), &input)?;

    let source = NetCDFSource::new(&input);
    let lazy = source.read_variable_lazy("tos", "time", 1)?;
    let regridder = Regridder::new(&lazy, &lazy, RemapMethod::Bilinear, &NativeBilinear)?;
    let regridded = regridder.regrid(&lazy)?;
    assert!(regridded.is_lazy());
    write_dataarray(&regridded, &output)?;

    let back = open_dataarray(&output, "tos")?;
    assert_eq!(back.values()?, source.read_variable("tos")?.values()?);
    Ok(())
}

#[test]
fn test_file_series_joined_along_time() -> Result<()> {
    let temp_dir = tempdir()?;
    let array = sample_array("tos");
    let first = temp_dir.path().join("tos_1979_01a.nc");
    let second = temp_dir.path().join("tos_1979_01b.nc");
    write_dataarray(&slice_dataarray(&array, "time", 0, 2)?, &first)?;
    write_dataarray(&slice_dataarray(&array, "time", 2, 3)?, &second)?;

    let joined = open_mfdataarray_lazy(&[&first, &second], "tos", "time", 1)?;
    assert!(joined.is_lazy());
    assert_eq!(joined.shape(), vec![3, 2, 4]);
    assert_eq!(joined.coord("time").and_then(|c| c.times()), Some(&[day(1), day(2), day(3)][..]));
    assert!(joined.coord("lat").is_some());
    assert_eq!(joined.values()?, array.values()?);

    let series = NetCDFSeries::new([&first, &second], "time");
    assert_eq!(series.list_variables()?, vec!["tos"]);
    assert_eq!(series.read_variable("tos")?.values()?, array.values()?);
    assert!(series.read_variable_lazy("tos", "lat", 1).is_err());
    Ok(())
}

#[test]
fn test_file_series_rejects_mismatched_files() -> Result<()> {
    let temp_dir = tempdir()?;
    let first = temp_dir.path().join("a.nc");
    let second = temp_dir.path().join("b.nc");
    write_dataarray(&sample_array("tos"), &first)?;

    let other = DataArray::new(["time", "lat", "lon"], Array3::<f64>::zeros((1, 2, 3)).into_dyn())?
        .with_name("tos")
        .with_coord(Coordinate::time("time", vec![day(4)]))?;
    write_dataarray(&other, &second)?;

    assert!(open_mfdataarray_lazy(&[&first, &second], "tos", "time", 1).is_err());
    let err = open_mfdataarray_lazy(&[&first], "tos", "depth", 1).unwrap_err();
    assert!(matches!(err, UmRegridError::DimensionNotFound { .. }));
    assert!(open_mfdataarray_lazy::<&std::path::Path>(&[], "tos", "time", 1).is_err());
    Ok(())
}

#[test]
fn test_dataset_round_trip() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("dataset.nc");

    let mut dataset = Dataset::new()
        .with_variable("tos", sample_array("tos"))
        .with_variable("sic", sample_array("sic"));
    dataset.attrs.insert("source".to_string(), "ERA-Interim".into());
    write_dataset(&dataset, &path)?;

    let mut names = data_variable_names(&path)?;
    names.sort();
    assert_eq!(names, vec!["sic", "tos"]);

    let back = open_dataset(&path)?;
    assert_eq!(back.len(), 2);
    assert_eq!(back.attrs.get("source").and_then(|v| v.as_str()), Some("ERA-Interim"));

    let source = NetCDFSource::new(&path);
    let only_tos = source.read_dataset(Some(&["tos"][..]))?;
    assert_eq!(only_tos.names(), vec!["tos"]);
    Ok(())
}

#[test]
fn test_bounds_round_trip() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("bounds.nc");

    let lat = Coordinate::from_1d("lat", vec![-45.0, 45.0])
        .with_attr("units", "degrees_north")
        .with_bounds(ndarray::array![[-90.0, 0.0], [0.0, 90.0]].into_dyn());
    let array = DataArray::new(["lat"], Array1::from(vec![1.0, 2.0]).into_dyn())?
        .with_name("zonal")
        .with_coord(lat)?;
    write_dataarray(&array, &path)?;

    assert_eq!(data_variable_names(&path)?, vec!["zonal"]);
    let back = open_dataarray(&path, "zonal")?;
    let bounds = back.coord("lat").and_then(|c| c.bounds.clone()).expect("bounds read back");
    assert_eq!(bounds.shape(), &[2, 2]);
    assert_eq!(bounds[[1, 1]], 90.0);
    Ok(())
}

#[test]
fn test_slice_along_time() -> Result<()> {
    let array = sample_array("tos");
    let sliced = slice_dataarray(&array, "time", 1, 3)?;
    assert_eq!(sliced.shape(), vec![2, 2, 4]);
    assert_eq!(sliced.coord("time").and_then(|c| c.times()), Some(&[day(2), day(3)][..]));
    assert_eq!(sliced.values()?[[0, 0, 0]], 8.0);

    assert!(slice_dataarray(&array, "time", 2, 5).is_err());
    assert!(slice_dataarray(&array, "level", 0, 1).is_err());
    Ok(())
}

#[test]
fn test_split_by_var() -> Result<()> {
    let dataset = Dataset::new()
        .with_variable("tos", sample_array("tos"))
        .with_variable("sic", sample_array("sic"));

    assert_eq!(split_by_var(&dataset, None)?.len(), 2);

    let chosen = split_by_var(&dataset, Some(&["sic"][..]))?;
    assert_eq!(chosen.len(), 1);
    assert_eq!(chosen[0].name.as_deref(), Some("sic"));

    let err = split_by_var(&dataset, Some(&["salt"][..])).unwrap_err();
    assert!(matches!(err, UmRegridError::VariableNotFound { .. }));
    Ok(())
}

#[test]
fn test_write_split_vars() -> Result<()> {
    let temp_dir = tempdir()?;
    let out_dir = temp_dir.path().join("split");
    let dataset = Dataset::new()
        .with_variable("tos", sample_array("tos"))
        .with_variable("sic", sample_array("sic"));

    let paths = write_split_vars(&dataset, &out_dir, Some(&["tos", "sic"][..]))?;
    assert_eq!(paths, vec![out_dir.join("tos.nc"), out_dir.join("sic.nc")]);

    let tos = open_dataset(&paths[0])?;
    assert_eq!(tos.names(), vec!["tos"]);
    assert!(tos.variable("tos")?.coord("lon").is_some());
    Ok(())
}
