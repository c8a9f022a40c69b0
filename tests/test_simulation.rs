#[cfg(test)]
mod test_simulation {
    use std::collections::HashMap;

    use approx::assert_relative_eq;
    use kinmodel::prelude::*;
    use peroxide::fuga::{BasicODESolver, ODEProblem, ODESolver, RK5};

    const KM: f64 = 0.5;
    const VMAX: f64 = 1.0;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn parameters(reaction: &str, values: &[(&str, f64)]) -> HashMap<String, ParameterValues> {
        HashMap::from([(
            reaction.to_string(),
            values
                .iter()
                .map(|(role, value)| (role.to_string(), *value))
                .collect(),
        )])
    }

    fn initial(values: &[(&str, f64)]) -> HashMap<String, f64> {
        values
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    /// Uni-uni convenience reaction that is practically irreversible and product-insensitive
    fn irreversible(name: &str, substrate: &str, product: &str, vmax: f64, km: f64) -> Reaction {
        let shape = make_convenience_with_inhibition(&[-1.0, 1.0], &[]).unwrap();
        let mechanism = ConvenienceInhibited::new(
            name,
            shape,
            &[("substrate1", substrate), ("product1", product)],
            &[],
        )
        .unwrap();

        Reaction::with_parameters(
            mechanism,
            &HashMap::from([
                ("vmax_forward".to_string(), vmax),
                ("k_equilibrium".to_string(), 1e12),
                ("km_substrate1".to_string(), km),
                ("km_product1".to_string(), 1e12),
            ]),
        )
        .unwrap()
    }

    fn michaelis_menten_model() -> KineticModel {
        KineticModel::new(vec![irreversible("MM", "S", "P", VMAX, KM)], vec![]).unwrap()
    }

    /// Solves `S + km ln S = S0 + km ln S0 - vmax t` for S
    fn michaelis_menten_analytic(s0: f64, t: f64) -> f64 {
        let c = s0 + KM * s0.ln() - VMAX * t;
        let mut s = s0;
        for _ in 0..100 {
            let g = s + KM * s.ln() - c;
            let next = s - g / (1.0 + KM / s);
            s = next.max(s / 10.0);
        }
        s
    }

    fn options(solver: SolverMethod) -> SolverOptions {
        SolverOptionsBuilder::default()
            .solver(solver)
            .rel_tol(1e-8)
            .abs_tol(1e-10)
            .build()
            .unwrap()
    }

    struct MichaelisMenten {
        km: f64,
        vmax: f64,
    }

    impl ODEProblem for MichaelisMenten {
        fn rhs(&self, _t: f64, y: &[f64], dy: &mut [f64]) -> Result<(), argmin_math::Error> {
            // State order [P, S]
            let v = self.vmax * y[1] / (self.km + y[1]);
            dy[0] = v;
            dy[1] = -v;
            Ok(())
        }
    }

    #[test]
    fn test_michaelis_menten_against_analytic_solution() {
        init_logger();

        for solver in [SolverMethod::AdaptiveBdf, SolverMethod::Rk45] {
            let mut model = michaelis_menten_model();
            let solution = model
                .solve((0.0, 2.0), initial(&[("S", 2.0), ("P", 0.0)]), &options(solver))
                .unwrap();

            assert!(solution.is_complete());
            assert_eq!(solution.species, vec!["P".to_string(), "S".to_string()]);
            assert_eq!(*solution.time.last().unwrap(), 2.0);

            let expected = michaelis_menten_analytic(2.0, 2.0);
            assert_relative_eq!(
                solution.final_value("S").unwrap(),
                expected,
                max_relative = 1e-5
            );
            assert_relative_eq!(
                solution.final_value("S").unwrap() + solution.final_value("P").unwrap(),
                2.0,
                max_relative = 1e-7
            );
        }
    }

    #[test]
    fn test_compiled_rhs_drives_peroxide_solver() {
        let mut model = michaelis_menten_model();
        let solver = BasicODESolver::new(RK5::default());
        let reference = MichaelisMenten { km: KM, vmax: VMAX };

        let (_, expected) = solver
            .solve(&reference, (0.0, 2.0), 0.01, &[0.0, 2.0])
            .expect("Integration failed");
        let function = model.rhs(SimulationType::Qssa).unwrap();
        let (_, actual) = solver
            .solve(function, (0.0, 2.0), 0.01, &[0.0, 2.0])
            .expect("Integration failed");

        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert_relative_eq!(a[0], e[0], max_relative = 1e-9);
            assert_relative_eq!(a[1], e[1], max_relative = 1e-9);
        }
    }

    #[test]
    fn test_zero_order_production() {
        init_logger();
        let k = 0.5;
        let t_end = 10.0;

        for solver in [SolverMethod::AdaptiveBdf, SolverMethod::Rk45] {
            let shape = make_convenience_with_inhibition(&[1.0], &[]).unwrap();
            let mechanism =
                ConvenienceInhibited::new("Synthesis", shape, &[("product1", "P")], &[]).unwrap();
            let mut model = KineticModel::new(vec![Reaction::new(mechanism)], vec![]).unwrap();
            model
                .parametrize(&parameters(
                    "Synthesis",
                    &[
                        ("vmax_forward", k),
                        ("k_equilibrium", 1e12),
                        ("km_product1", 1e12),
                    ],
                ))
                .unwrap();

            let solution = model
                .solve((0.0, t_end), vec![0.0], &options(solver))
                .unwrap();

            assert!(solution.is_complete());
            assert_relative_eq!(
                solution.final_value("P").unwrap(),
                k * t_end,
                max_relative = 1e-8
            );
        }
    }

    #[test]
    fn test_rhs_is_rebuilt_only_after_structural_changes() {
        init_logger();
        let mut model = michaelis_menten_model();
        let options = SolverOptions::default();
        let y0 = initial(&[("S", 2.0), ("P", 0.0)]);

        let first = model.solve((0.0, 2.0), &y0, &options).unwrap();
        assert_eq!(model.rhs_builds(), 1);

        let second = model.solve((0.0, 2.0), &y0, &options).unwrap();
        assert_eq!(model.rhs_builds(), 1);
        assert_eq!(first, second);

        // New parameter values are picked up without recompiling
        model
            .parametrize(&parameters("MM", &[("vmax_forward", 2.0 * VMAX)]))
            .unwrap();
        let faster = model.solve((0.0, 2.0), &y0, &options).unwrap();
        assert_eq!(model.rhs_builds(), 1);
        assert!(faster.final_value("S").unwrap() < first.final_value("S").unwrap());

        model
            .add_reaction(irreversible("Decay", "P", "Q", 0.3, 1.0))
            .unwrap();
        let mut y0 = y0;
        y0.insert("Q".to_string(), 0.0);
        let extended = model.solve((0.0, 2.0), &y0, &options).unwrap();

        assert_eq!(model.rhs_builds(), 2);
        assert_eq!(extended.species, vec!["P", "Q", "S"]);
        assert!(extended.final_value("Q").unwrap() > 0.0);
    }

    #[test]
    fn test_species_names_that_are_not_identifiers() {
        init_logger();

        for (substrate, product) in [("13dpg", "3pg"), ("D-glc", "g6p")] {
            let mut model =
                KineticModel::new(vec![irreversible("R1", substrate, product, VMAX, KM)], vec![])
                    .unwrap();
            let solution = model
                .solve(
                    (0.0, 2.0),
                    initial(&[(substrate, 2.0), (product, 0.0)]),
                    &options(SolverMethod::AdaptiveBdf),
                )
                .unwrap();

            assert!(solution.is_complete(), "{:?}", solution.status);
            assert_relative_eq!(
                solution.final_value(substrate).unwrap(),
                michaelis_menten_analytic(2.0, 2.0),
                max_relative = 1e-5
            );
        }
    }

    #[test]
    fn test_boundary_order_is_observable() {
        let t_end = 5.0;
        let y0 = initial(&[("S", 2.0), ("P", 0.0)]);

        let mut flux_then_clamp = michaelis_menten_model();
        flux_then_clamp.add_boundary(ConstantFlux::new("P", 1.0));
        flux_then_clamp.add_boundary(ConstantConcentration::new("P"));

        let mut clamp_then_flux = michaelis_menten_model();
        clamp_then_flux.add_boundary(ConstantConcentration::new("P"));
        clamp_then_flux.add_boundary(ConstantFlux::new("P", 1.0));

        let options = SolverOptions::default();
        let clamped = flux_then_clamp.solve((0.0, t_end), &y0, &options).unwrap();
        let fed = clamp_then_flux.solve((0.0, t_end), &y0, &options).unwrap();

        assert_eq!(clamped.final_value("P").unwrap(), 0.0);
        assert_relative_eq!(fed.final_value("P").unwrap(), t_end, max_relative = 1e-10);

        // The substrate is consumed either way
        assert!(clamped.final_value("S").unwrap() < 2.0);
        assert_relative_eq!(
            clamped.final_value("S").unwrap(),
            fed.final_value("S").unwrap(),
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_stiff_chain_solvers_agree() {
        init_logger();
        let reactions = vec![
            irreversible("Fast", "A", "B", 1e3, 1.0),
            irreversible("Slow", "B", "C", 0.1, 1.0),
        ];
        let y0 = vec![1.0, 0.0, 0.0];

        let mut bdf_model = KineticModel::new(reactions.clone(), vec![]).unwrap();
        let mut rk_model = KineticModel::new(reactions, vec![]).unwrap();

        let bdf = bdf_model
            .solve((0.0, 10.0), y0.clone(), &options(SolverMethod::AdaptiveBdf))
            .unwrap();
        let rk = rk_model
            .solve((0.0, 10.0), y0, &options(SolverMethod::Rk45))
            .unwrap();

        assert!(bdf.is_complete() && rk.is_complete());
        assert!(bdf.time.len() < rk.time.len());
        for species in ["A", "B", "C"] {
            assert_relative_eq!(
                bdf.final_value(species).unwrap(),
                rk.final_value(species).unwrap(),
                epsilon = 1e-6,
                max_relative = 1e-4
            );
        }
        assert_relative_eq!(
            bdf.final_state().unwrap().iter().sum::<f64>(),
            1.0,
            max_relative = 1e-7
        );
    }

    #[test]
    fn test_trajectory_is_recorded_at_every_step() {
        let mut model = michaelis_menten_model();
        let solution = model
            .solve(
                (1.0, 3.0),
                initial(&[("S", 2.0), ("P", 0.0)]),
                &SolverOptions::default(),
            )
            .unwrap();

        assert_eq!(solution.time[0], 1.0);
        assert_eq!(solution.states[0], vec![0.0, 2.0]);
        assert_eq!(solution.time.len(), solution.states.len());
        assert!(solution.time.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(solution.to_matrix().shape(), &[solution.time.len(), 2]);
    }

    #[test]
    fn test_max_steps_stops_early() {
        let mut model = michaelis_menten_model();
        let options = SolverOptionsBuilder::default().max_steps(3).build().unwrap();

        let solution = model
            .solve((0.0, 100.0), initial(&[("S", 2.0), ("P", 0.0)]), &options)
            .unwrap();

        assert!(!solution.is_complete());
        assert_eq!(solution.time.len(), 4);
        match &solution.status {
            SolveStatus::StoppedEarly { t, reason } => {
                assert_eq!(*t, *solution.time.last().unwrap());
                assert!(reason.contains("Maximum number of steps"));
            }
            SolveStatus::Completed => panic!("Expected the solve to stop early"),
        }
    }

    #[test]
    fn test_unsupported_simulation_types() {
        let mut model = michaelis_menten_model();
        let y0 = initial(&[("S", 2.0), ("P", 0.0)]);

        for simulation_type in [SimulationType::Tqssa, SimulationType::Full] {
            let options = SolverOptionsBuilder::default()
                .simulation_type(simulation_type)
                .build()
                .unwrap();
            let result = model.solve((0.0, 1.0), &y0, &options);

            assert!(result.unwrap_err().is_not_supported());
        }
        assert_eq!(model.rhs_builds(), 0);
    }

    #[test]
    fn test_model_errors() {
        let mut model = michaelis_menten_model();

        assert!(matches!(
            model.add_reaction(irreversible("MM", "X", "Y", 1.0, 1.0)),
            Err(KineticsError::DuplicateName(name)) if name == "MM"
        ));
        assert!(matches!(
            model.parametrize(&parameters("Unknown", &[("vmax_forward", 1.0)])),
            Err(KineticsError::UnknownReaction(name)) if name == "Unknown"
        ));
        assert!(matches!(
            model.parametrize(&parameters("MM", &[("kcat", 1.0)])),
            Err(KineticsError::UnknownRole(role)) if role == "kcat"
        ));
    }

    #[test]
    fn test_missing_values() {
        let shape = make_convenience_with_inhibition(&[-1.0, 1.0], &[]).unwrap();
        let mechanism = ConvenienceInhibited::new(
            "MM",
            shape,
            &[("substrate1", "S"), ("product1", "P")],
            &[],
        )
        .unwrap();
        let mut unparametrized = KineticModel::new(vec![Reaction::new(mechanism)], vec![]).unwrap();

        assert!(matches!(
            unparametrized.solve((0.0, 1.0), vec![2.0, 0.0], &SolverOptions::default()),
            Err(KineticsError::MissingParameterValue(_))
        ));

        let mut model = michaelis_menten_model();
        assert!(matches!(
            model.solve((0.0, 1.0), initial(&[("S", 2.0)]), &SolverOptions::default()),
            Err(KineticsError::MissingInitialValue(name)) if name == "P"
        ));
        assert!(matches!(
            model.solve((0.0, 1.0), vec![2.0], &SolverOptions::default()),
            Err(KineticsError::Simulation(
                SimulationError::StateDimensionMismatch { expected: 2, found: 1 }
            ))
        ));
        assert!(matches!(
            model.solve((1.0, 0.0), vec![0.0, 2.0], &SolverOptions::default()),
            Err(KineticsError::Simulation(SimulationError::InvalidTimeSpan { .. }))
        ));
    }

    #[test]
    fn test_model_introspection() {
        let model = KineticModel::new(
            vec![
                irreversible("R1", "A", "B", 1.0, 1.0),
                irreversible("R2", "B", "C", 1.0, 1.0),
            ],
            vec![],
        )
        .unwrap();

        let species = model.species();
        let names: Vec<&str> = species.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(model.parameters().len(), 8);
        assert_eq!(model.parameters()["vmax_forward_R2"], 1.0);
        assert_eq!(model.generation(), 2);
    }
}
