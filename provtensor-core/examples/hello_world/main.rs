use provtensor_core::{debug_dump_computational_graph, Array, DType, Device, Graph, Result};

fn main() -> Result<()> {
    let graph = Graph::empty();
    let device = Device::best()?;

    let a = Array::full(&graph, 1.0f32, [3, 4], &device)?;
    let b = Array::full(&graph, 2.0f32, [3, 4], &device)?;
    let c = Array::full(&graph, 3.0f32, [3, 4], &device)?;
    let mut res = a.mul(&b)?.add(&c)?;
    res.iadd(&Array::full(&graph, 4.0f32, [3, 4], &device)?)?;

    assert_eq!(res.to_vec::<f32>()?, vec![9.0; 12]);

    let mut stdout = std::io::stdout();
    debug_dump_computational_graph(&mut stdout, &res, 0)?;

    let mask = Array::ones(&graph, [4], DType::Bool, &device)?;
    let none = mask.zeros_like()?;
    dbg!(mask.mul(&none)?.to_vec::<bool>()?);

    println!("{}", graph.to_dot());
    Ok(())
}
